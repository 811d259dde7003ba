//! Pipeline stages for document ingestion.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the job controller only sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ preprocess ──▶ recognize ──▶ extract
//! (validate)  (render/decode,  (pooled engine,  (8 rule-based
//!              resize, binarise) retry)          extractors)
//! ```
//!
//! 1. [`input`]      - resolve paths/URLs into a [`input::DocumentFile`] and
//!    reject unsupported or oversized uploads
//! 2. [`preprocess`] - decode (PDFs via [`render`]), cap the long edge,
//!    binarise; runs in `spawn_blocking`
//! 3. [`recognize`]  - run a pooled engine with bounded retries and
//!    normalise its output
//! 4. [`extract`]    - structured field extraction over the recognised text

pub mod extract;
pub mod input;
pub mod preprocess;
pub mod recognize;
pub mod render;
