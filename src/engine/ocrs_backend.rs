//! [`RecognitionEngine`] backed by `ocrs`, a pure-Rust OCR engine running
//! neural models through `rten`.
//!
//! Requires two model files, `text-detection.rten` and `text-recognition.rten`,
//! in `$XDG_CACHE_HOME/ocrs` (normally `~/.cache/ocrs`, where `ocrs-cli`
//! downloads them) or a directory given to [`OcrsEngineFactory::from_dir`].
//! Build in release mode; debug builds of `rten` are extremely slow.

use super::{EngineFactory, EngineParams, RawRecognition, RawWord, RecognitionEngine};
use crate::error::EngineError;
use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// ocrs does not score words; every recognised word is reported at this value.
const UNSCORED_CONFIDENCE: f32 = 100.0;

fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Loads ocrs engines from a model directory.
#[derive(Debug, Clone)]
pub struct OcrsEngineFactory {
    detection_model_path: PathBuf,
    recognition_model_path: PathBuf,
}

impl Default for OcrsEngineFactory {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrsEngineFactory {
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    fn load_model(path: &Path) -> Result<Model, EngineError> {
        if !path.exists() {
            return Err(EngineError::Unavailable(format!(
                "model not found at {}; run `ocrs-cli` once to download models",
                path.display()
            )));
        }
        Model::load_file(path).map_err(|e| {
            EngineError::Unavailable(format!("failed to load {}: {}", path.display(), e))
        })
    }
}

impl EngineFactory for OcrsEngineFactory {
    fn name(&self) -> &str {
        "ocrs"
    }

    fn create(&self) -> Result<Box<dyn RecognitionEngine>, EngineError> {
        info!("Loading ocrs models from {}", self.detection_model_path.display());
        let detection_model = Self::load_model(&self.detection_model_path)?;
        let recognition_model = Self::load_model(&self.recognition_model_path)?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| EngineError::Unavailable(format!("failed to initialise ocrs: {}", e)))?;

        Ok(Box::new(OcrsRecognizer {
            engine,
            params: EngineParams::default(),
        }))
    }
}

/// One loaded ocrs engine.
pub struct OcrsRecognizer {
    engine: OcrEngine,
    params: EngineParams,
}

impl RecognitionEngine for OcrsRecognizer {
    fn configure(&mut self, params: &EngineParams) -> Result<(), EngineError> {
        // ocrs has a fixed latin recogniser and always segments itself; the
        // params only decide how output is assembled.
        self.params = params.clone();
        Ok(())
    }

    fn recognize(&mut self, image: &DynamicImage) -> Result<RawRecognition, EngineError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|e| {
            EngineError::InvalidInput(format!("image source {}x{}: {}", width, height, e))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| EngineError::Transient(format!("ocrs preprocessing: {}", e)))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|e| EngineError::Transient(format!("word detection: {}", e)))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|e| EngineError::Transient(format!("line recognition: {}", e)))?;

        let mut text_lines = Vec::with_capacity(lines.len());
        let mut words = Vec::new();
        for line in lines.iter().flatten() {
            let line_text = if self.params.preserve_interword_spaces {
                line.to_string()
            } else {
                line.to_string().split_whitespace().collect::<Vec<_>>().join(" ")
            };
            if line_text.trim().is_empty() {
                continue;
            }
            text_lines.push(line_text);

            if self.params.word_level {
                for word in line.words() {
                    let rect = word.bounding_rect();
                    words.push(RawWord {
                        text: word.to_string(),
                        bbox: (
                            rect.left() as f32,
                            rect.top() as f32,
                            rect.width() as f32,
                            rect.height() as f32,
                        ),
                        confidence: UNSCORED_CONFIDENCE,
                    });
                }
            }
        }

        debug!("ocrs recognised {} lines, {} words", text_lines.len(), words.len());
        Ok(RawRecognition {
            text: text_lines.join("\n"),
            words,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_from_dir_points_at_model_files() {
        let f = OcrsEngineFactory::from_dir("/tmp/models");
        assert_eq!(
            f.detection_model_path,
            PathBuf::from("/tmp/models/text-detection.rten")
        );
        assert_eq!(
            f.recognition_model_path,
            PathBuf::from("/tmp/models/text-recognition.rten")
        );
    }

    #[test]
    fn missing_models_are_unavailable() {
        let f = OcrsEngineFactory::from_dir("/nonexistent/sitescan-models");
        match f.create() {
            Err(EngineError::Unavailable(msg)) => assert!(msg.contains("not found")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("engine created without models"),
        }
    }
}
