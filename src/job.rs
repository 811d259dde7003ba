//! Job record and its stage state machine.
//!
//! ```text
//! queued ──▶ preprocessing ──▶ recognizing ──▶ extracting ──▶ completed
//!   │              │                │               │
//!   └──────────────┴────────────────┴───────────────┴──────▶ failed
//! ```
//!
//! Transitions only move forward. `failed` is reachable from every
//! non-terminal state; `completed` and `failed` accept nothing further.

use crate::output::JobOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Preprocessing,
    Recognizing,
    Extracting,
    Completed,
    Failed,
}

impl JobStatus {
    /// Progress percentage reported while the job sits in this stage.
    pub fn progress(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Preprocessing => 10,
            JobStatus::Recognizing => 30,
            JobStatus::Extracting => 70,
            JobStatus::Completed => 100,
            JobStatus::Failed => 0,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Preprocessing => 1,
            JobStatus::Recognizing => 2,
            JobStatus::Extracting => 3,
            JobStatus::Completed | JobStatus::Failed => 4,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStatus::Failed || next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Preprocessing => "preprocessing",
            JobStatus::Recognizing => "recognizing",
            JobStatus::Extracting => "extracting",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One document's processing request, as seen through the status registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub document_id: String,
    pub status: JobStatus,
    /// Percent complete, derived from `status`.
    pub progress: u8,
    pub result: Option<JobOutput>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<u64>,
}

impl Job {
    pub fn new(id: Uuid, document_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            document_id: document_id.into(),
            status: JobStatus::Queued,
            progress: JobStatus::Queued.progress(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
            processing_time_ms: None,
        }
    }

    /// Move to `next` if the transition is allowed. Returns whether it moved.
    pub(crate) fn advance(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        self.status = next;
        self.progress = next.progress();
        self.updated_at = now;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        true
    }

    pub(crate) fn complete(&mut self, output: JobOutput) -> bool {
        let elapsed = output.processing_time_ms;
        if !self.advance(JobStatus::Completed) {
            return false;
        }
        self.processing_time_ms = Some(elapsed);
        self.result = Some(output);
        true
    }

    pub(crate) fn fail(&mut self, message: String, elapsed_ms: u64) -> bool {
        if !self.advance(JobStatus::Failed) {
            return false;
        }
        self.error = Some(message);
        self.processing_time_ms = Some(elapsed_ms);
        true
    }
}
