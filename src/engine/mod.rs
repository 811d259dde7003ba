//! Recognition engine boundary.
//!
//! The pipeline never loads models itself. It talks to an engine through
//! [`RecognitionEngine`] (one stateful, expensive instance) and asks an
//! [`EngineFactory`] for new instances when the pool runs dry.
//!
//! Engine calls are blocking and CPU-heavy; the pool and executor always run
//! them on the blocking thread pool, so implementations can simply block.

use crate::error::EngineError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

#[cfg(feature = "ocr")]
pub mod ocrs_backend;

/// How the engine should split the page into text regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegmentation {
    /// Treat the whole bitmap as one uniform block of text. (default)
    #[default]
    SingleBlock,
    /// Let the engine detect layout on its own.
    Auto,
    /// Single text line.
    SingleLine,
}

/// Parameters pushed to the engine with [`RecognitionEngine::configure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineParams {
    pub segmentation: PageSegmentation,
    /// Report per-word boxes and confidences.
    pub word_level: bool,
    /// Keep runs of spaces between words instead of collapsing them. Table
    /// detection depends on this.
    pub preserve_interword_spaces: bool,
    /// Engine language pack identifier, e.g. `ind+eng`.
    pub language: String,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            segmentation: PageSegmentation::SingleBlock,
            word_level: true,
            preserve_interword_spaces: true,
            language: "ind+eng".to_string(),
        }
    }
}

/// One word as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWord {
    pub text: String,
    /// `(x, y, width, height)` in bitmap pixels.
    pub bbox: (f32, f32, f32, f32),
    /// Engine confidence on a 0–100 scale.
    pub confidence: f32,
}

/// Raw engine output before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecognition {
    pub text: String,
    pub words: Vec<RawWord>,
}

/// A loaded recognition engine instance.
pub trait RecognitionEngine: Send {
    /// Apply `params`; called before every recognition.
    fn configure(&mut self, params: &EngineParams) -> Result<(), EngineError>;

    /// Recognise text on a normalised bitmap.
    fn recognize(&mut self, image: &DynamicImage) -> Result<RawRecognition, EngineError>;

    /// Release engine resources. Called exactly once, when the pool drops the handle.
    fn dispose(&mut self) {}
}

/// Creates engine instances for the pool.
pub trait EngineFactory: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Construct and load a new engine.
    fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_request_single_block_words() {
        let p = EngineParams::default();
        assert_eq!(p.segmentation, PageSegmentation::SingleBlock);
        assert!(p.word_level);
        assert!(p.preserve_interword_spaces);
    }
}
