//! CLI binary for sitescan.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs the documents through a `JobController` and prints
//! results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use serde::Serialize;
use sitescan::output::write_json_atomic;
use sitescan::pipeline::input::display_name;
use sitescan::{
    inspect, DocumentFile, EngineFactory, ErrorKind, ExtractionConfig, JobController, JobFailure,
    JobOutput, JobProgressCallback, JobStatus, PipelineConfig, ProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch, one log line per
/// finished document. Jobs finish out of order, so names are tracked by id.
struct CliProgressCallback {
    bar: ProgressBar,
    names: Mutex<HashMap<Uuid, String>>,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            names: Mutex::new(HashMap::new()),
        })
    }

    fn name_of(&self, job_id: Uuid) -> String {
        self.names
            .lock()
            .get(&job_id)
            .cloned()
            .unwrap_or_else(|| job_id.to_string())
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job_id: Uuid, document_id: &str) {
        self.names.lock().insert(job_id, document_id.to_string());
    }

    fn on_stage(&self, job_id: Uuid, status: JobStatus, _progress: u8) {
        self.bar
            .set_message(format!("{} {}", self.name_of(job_id), dim(&status.to_string())));
    }

    fn on_retry(&self, job_id: Uuid, attempt: u32, max_attempts: u32, error: &str) {
        self.bar.println(format!(
            "  {} {}  attempt {}/{} failed: {}",
            yellow("↻"),
            self.name_of(job_id),
            attempt,
            max_attempts,
            dim(error)
        ));
    }

    fn on_job_complete(&self, job_id: Uuid, processing_time_ms: u64, text_len: usize) {
        let name = self.names.lock().remove(&job_id).unwrap_or_default();
        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            green("✓"),
            name,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{:.1}s", processing_time_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_job_failed(&self, job_id: Uuid, error: &str) {
        let name = self.names.lock().remove(&job_id).unwrap_or_default();

        // Keep one line per document.
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 80 {
            format!("{}…", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };

        self.bar
            .println(format!("  {} {:<32}  {}", red("✗"), name, red(&msg)));
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scan one photo, print a summary
  sitescan laporan-harian.jpg

  # Several documents, JSON on stdout
  sitescan --json surat-jalan-01.png surat-jalan-02.png > hasil.json

  # Write results to a file
  sitescan scans/*.jpg -o results/batch.json

  # Scanned PDF from a URL
  sitescan https://example.com/po-1234.pdf

  # Check format and dimensions only (no OCR)
  sitescan --inspect-only denah.tiff

SUPPORTED INPUTS:
  pdf (first page), jpg, jpeg, png, tiff, bmp; up to 50 MB by default.

ENVIRONMENT VARIABLES:
  SITESCAN_MODEL_DIR      Directory with text-detection.rten / text-recognition.rten
  SITESCAN_POOL_SIZE      Engines kept warm
  SITESCAN_CONCURRENCY    Documents processed at once
  PDFIUM_LIB_PATH         Directory containing libpdfium (for PDF inputs)
  RUST_LOG                Log filter, e.g. sitescan=debug

SETUP:
  Build with the bundled recognition backend:
    cargo install sitescan --features ocr
  and place the ocrs models in ~/.cache/ocrs (or pass --model-dir).
"#;

/// Extract text and site data from construction documents.
#[derive(Parser, Debug)]
#[command(
    name = "sitescan",
    version,
    about = "Extract text and structured fields from construction-site documents",
    long_about = "OCR photos and scanned PDFs of construction paperwork (daily reports, \
delivery notes, purchase orders) and extract dates, amounts, materials, personnel, \
coordinates, specifications, signature blocks and tables.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Write JSON results to this file instead of stdout.
    #[arg(short, long, env = "SITESCAN_OUTPUT")]
    output: Option<PathBuf>,

    /// Print JSON results instead of a summary.
    #[arg(long, env = "SITESCAN_JSON")]
    json: bool,

    /// Validate and decode only; report format and dimensions.
    #[arg(long)]
    inspect_only: bool,

    /// Directory containing the recognition models.
    #[arg(long, env = "SITESCAN_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Engines kept warm in the worker pool.
    #[arg(long, env = "SITESCAN_POOL_SIZE", default_value_t = 2)]
    pool_size: usize,

    /// Documents processed at once.
    #[arg(short, long, env = "SITESCAN_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Recognition attempts per document.
    #[arg(long, env = "SITESCAN_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Initial retry delay in milliseconds.
    #[arg(long, env = "SITESCAN_RETRY_BACKOFF_MS", default_value_t = 200)]
    retry_backoff_ms: u64,

    /// Longest edge of the normalised bitmap in pixels.
    #[arg(long, env = "SITESCAN_MAX_DIMENSION", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(100..=10_000))]
    max_dimension: u32,

    /// Binarisation threshold (0–255).
    #[arg(long, env = "SITESCAN_THRESHOLD", default_value_t = 128)]
    threshold: u8,

    /// Largest accepted file in megabytes.
    #[arg(long, env = "SITESCAN_MAX_FILE_MB", default_value_t = 50)]
    max_file_mb: u64,

    /// Report each material/personnel keyword once per document.
    #[arg(long, env = "SITESCAN_DEDUPE_KEYWORDS")]
    dedupe_keywords: bool,

    /// Engine language pack.
    #[arg(long, env = "SITESCAN_LANGUAGE", default_value = "ind+eng")]
    language: String,

    /// Disable progress bar.
    #[arg(long, env = "SITESCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SITESCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SITESCAN_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SITESCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

/// One entry of the JSON report.
#[derive(Serialize)]
#[serde(untagged)]
enum Report {
    Completed(JobOutput),
    Failed(FailureReport),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureReport {
    id: Option<Uuid>,
    document_id: String,
    status: JobStatus,
    error: String,
    error_kind: ErrorKind,
    processing_time_ms: u64,
}

impl From<JobFailure> for FailureReport {
    fn from(f: JobFailure) -> Self {
        Self {
            id: Some(f.job_id),
            document_id: f.document_id,
            status: JobStatus::Failed,
            error_kind: f.error.kind(),
            error: f.error.to_string(),
            processing_time_ms: f.processing_time_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the per-document feedback, so INFO logs are
    // suppressed while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let base_config = build_config(&cli, None)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let mut infos = Vec::new();
        for input in &cli.inputs {
            let file = DocumentFile::resolve(input, cli.download_timeout)
                .await
                .with_context(|| format!("Failed to read {}", input))?;
            let info = inspect(&file, &base_config)
                .await
                .with_context(|| format!("Failed to inspect {}", input))?;
            if !cli.json {
                println!("File:         {}", input);
                println!("Format:       {}", info.extension);
                println!("Size:         {} bytes", info.size_bytes);
                println!("Dimensions:   {}x{}", info.width, info.height);
                println!(
                    "Normalised:   {}x{}",
                    info.normalized_width, info.normalized_height
                );
                println!();
            }
            infos.push(info);
        }
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&infos).context("Failed to serialise inspection")?
            );
        }
        return Ok(());
    }

    // ── Resolve inputs ───────────────────────────────────────────────────
    let mut files = Vec::with_capacity(cli.inputs.len());
    let mut reports: Vec<Report> = Vec::new();
    for input in &cli.inputs {
        match DocumentFile::resolve(input, cli.download_timeout).await {
            Ok(file) => files.push((file, display_name(input))),
            Err(e) => {
                if !cli.quiet {
                    eprintln!("{} {}: {}", red("✗"), input, e);
                }
                reports.push(Report::Failed(FailureReport {
                    id: None,
                    document_id: display_name(input),
                    status: JobStatus::Failed,
                    error_kind: e.kind(),
                    error: e.to_string(),
                    processing_time_ms: 0,
                }));
            }
        }
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let progress = show_progress.then(|| CliProgressCallback::new(files.len()));
    let config = build_config(
        &cli,
        progress.clone().map(|cb| cb as Arc<dyn JobProgressCallback>),
    )?;

    let factory = engine_factory(&cli)?;
    let controller = JobController::startup(factory, config).await;
    let results = controller.process_all(files, cli.concurrency).await;
    controller.shutdown();
    if let Some(cb) = &progress {
        cb.finish();
    }

    let completed = results.iter().filter(|r| r.is_ok()).count();
    reports.extend(results.into_iter().map(|r| match r {
        Ok(out) => Report::Completed(out),
        Err(failure) => Report::Failed(failure.into()),
    }));
    let failed = reports.len() - completed;

    // ── Emit ─────────────────────────────────────────────────────────────
    if let Some(ref path) = cli.output {
        write_json_atomic(path, &reports)
            .await
            .context("Failed to write results")?;
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} documents  →  {}",
                if failed == 0 { green("✔") } else { yellow("⚠") },
                completed,
                reports.len(),
                bold(&path.display().to_string()),
            );
        }
    } else if cli.json {
        let json = serde_json::to_string_pretty(&reports).context("Failed to serialise results")?;
        println!("{json}");
    } else if !cli.quiet {
        for report in &reports {
            print_summary(report);
        }
        eprintln!(
            "{} {}/{} documents processed",
            if failed == 0 { green("✔") } else { yellow("⚠") },
            bold(&completed.to_string()),
            reports.len()
        );
    }

    if completed == 0 && failed > 0 {
        anyhow::bail!("All {} documents failed", failed);
    }
    Ok(())
}

fn print_summary(report: &Report) {
    match report {
        Report::Completed(out) => {
            let data = &out.extracted_data;
            println!("{}", bold(&out.document_id));
            println!(
                "  {} chars, confidence {:.0}%, {}ms",
                out.extracted_text.chars().count(),
                out.confidence * 100.0,
                out.processing_time_ms
            );
            for category in sitescan::FieldCategory::ALL {
                let fields = data.get(category);
                if fields.is_empty() {
                    continue;
                }
                let values: Vec<&str> = fields
                    .iter()
                    .take(5)
                    .map(|f| f.value.lines().next().unwrap_or_default())
                    .collect();
                let more = fields.len().saturating_sub(values.len());
                println!(
                    "  {:<15} {}{}",
                    category.as_str(),
                    values.join(", "),
                    if more > 0 { dim(&format!(" (+{more})")) } else { String::new() }
                );
            }
        }
        Report::Failed(f) => {
            println!("{}  {}", bold(&f.document_id), red(&f.error));
        }
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut engine = sitescan::EngineParams::default();
    engine.language = cli.language.clone();

    let mut builder = PipelineConfig::builder()
        .pool_size(cli.pool_size)
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .max_dimension(cli.max_dimension)
        .binarize_threshold(cli.threshold)
        .max_file_bytes(cli.max_file_mb.saturating_mul(1024 * 1024))
        .download_timeout_secs(cli.download_timeout)
        .engine(engine)
        .extraction(ExtractionConfig {
            dedupe_keywords: cli.dedupe_keywords,
            ..Default::default()
        });

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(feature = "ocr")]
fn engine_factory(cli: &Cli) -> Result<Arc<dyn EngineFactory>> {
    use sitescan::engine::ocrs_backend::OcrsEngineFactory;

    let factory = match &cli.model_dir {
        Some(dir) => OcrsEngineFactory::from_dir(dir),
        None => OcrsEngineFactory::default(),
    };
    Ok(Arc::new(factory))
}

#[cfg(not(feature = "ocr"))]
fn engine_factory(cli: &Cli) -> Result<Arc<dyn EngineFactory>> {
    let _ = &cli.model_dir;
    anyhow::bail!(
        "This build has no recognition backend.\n\
         Rebuild with `--features ocr`, or use --inspect-only."
    )
}
