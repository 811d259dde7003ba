//! Streaming batch API: emit job results as they complete.
//!
//! [`JobController::process_all`] waits for the whole batch and returns
//! results in input order. [`process_stream`] instead yields each result as
//! soon as its job finishes, so a caller can report progress or persist
//! results incrementally. Completion order is not input order; match results
//! to inputs by `document_id`.

use crate::controller::{JobController, JobFailure};
use crate::output::JobOutput;
use crate::pipeline::input::DocumentFile;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of job results.
pub type JobStream = Pin<Box<dyn Stream<Item = Result<JobOutput, JobFailure>> + Send>>;

/// Run `files` through `controller`, at most `concurrency` jobs at a time,
/// yielding results in completion order.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use sitescan::{process_stream, DocumentFile, JobController};
/// use std::sync::Arc;
///
/// # async fn run(controller: Arc<JobController>) {
/// let files = vec![(DocumentFile::new("a.png", std::fs::read("a.png").unwrap()), "doc-a".to_string())];
/// let mut results = process_stream(controller, files, 4);
/// while let Some(result) = results.next().await {
///     match result {
///         Ok(out) => println!("{}: {} chars", out.document_id, out.extracted_text.len()),
///         Err(failure) => eprintln!("{failure}"),
///     }
/// }
/// # }
/// ```
pub fn process_stream(
    controller: Arc<JobController>,
    files: Vec<(DocumentFile, String)>,
    concurrency: usize,
) -> JobStream {
    let concurrency = concurrency.max(1);
    info!(
        "Streaming {} documents with concurrency {}",
        files.len(),
        concurrency
    );
    let s = stream::iter(files.into_iter().map(move |(file, document_id)| {
        let controller = Arc::clone(&controller);
        async move { controller.start(file, document_id).await }
    }))
    .buffer_unordered(concurrency);
    Box::pin(s)
}
