//! In-memory job status registry.
//!
//! Readers (`get`, `list`, ...) are open to anyone holding the registry; only
//! the job controller writes. Finished jobs are retained for a bounded time and
//! up to a bounded count so a long-running service does not grow without
//! limit. Jobs still in flight are never evicted.

use crate::job::{Job, JobStatus};
use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// How long and how many finished jobs stay queryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Finished jobs older than this are purged. `None` keeps them forever.
    pub ttl: Option<Duration>,
    /// Above this many entries the oldest finished jobs are evicted.
    pub max_jobs: Option<usize>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(60 * 60)),
            max_jobs: Some(10_000),
        }
    }
}

impl RetentionPolicy {
    /// Keep everything.
    pub fn unbounded() -> Self {
        Self {
            ttl: None,
            max_jobs: None,
        }
    }
}

/// Concurrent map of job id → [`Job`].
#[derive(Debug, Default)]
pub struct StatusRegistry {
    jobs: DashMap<Uuid, Job>,
    retention: RetentionPolicy,
}

impl StatusRegistry {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            jobs: DashMap::new(),
            retention,
        }
    }

    /// Snapshot of one job.
    pub fn get(&self, id: &Uuid) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    pub fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.jobs.get(id).map(|entry| entry.status)
    }

    /// Snapshot of every job, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Jobs not yet completed or failed.
    pub fn active_count(&self) -> usize {
        self.jobs.iter().filter(|e| !e.status.is_terminal()).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Drop finished jobs older than the TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Some(ttl) = self.retention.ttl else {
            return 0;
        };
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            return 0;
        };

        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.finished_at.is_some_and(|t| t < cutoff))
        });
        let removed = before.saturating_sub(self.jobs.len());
        if removed > 0 {
            debug!("Registry purged {} expired jobs", removed);
        }
        removed
    }

    pub(crate) fn insert(&self, job: Job) {
        self.purge_expired();
        self.jobs.insert(job.id, job);
        self.enforce_capacity();
    }

    /// Apply `f` to the job with `id`. Returns `None` if it is not registered.
    pub(crate) fn update<R>(&self, id: &Uuid, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.jobs.get_mut(id).map(|mut entry| f(entry.value_mut()))
    }

    fn enforce_capacity(&self) {
        let Some(max) = self.retention.max_jobs else {
            return;
        };
        let excess = self.jobs.len().saturating_sub(max);
        if excess == 0 {
            return;
        }

        let mut finished: Vec<_> = self
            .jobs
            .iter()
            .filter(|e| e.status.is_terminal())
            .map(|e| (e.finished_at.unwrap_or(e.updated_at), *e.key()))
            .collect();
        finished.sort();

        let evicted = finished
            .into_iter()
            .take(excess)
            .filter(|(_, id)| self.jobs.remove(id).is_some())
            .count();
        debug!(
            "Registry over capacity ({} > {}): evicted {} finished jobs",
            self.jobs.len() + evicted,
            max,
            evicted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(doc: &str) -> Job {
        let mut job = Job::new(Uuid::new_v4(), doc);
        job.fail("boom".into(), 5);
        job
    }

    #[test]
    fn insert_get_update() {
        let reg = StatusRegistry::new(RetentionPolicy::unbounded());
        let job = Job::new(Uuid::new_v4(), "doc-1");
        let id = job.id;
        reg.insert(job);
        assert_eq!(reg.status(&id), Some(JobStatus::Queued));

        let moved = reg.update(&id, |j| j.advance(JobStatus::Preprocessing));
        assert_eq!(moved, Some(true));
        assert_eq!(reg.get(&id).unwrap().progress, 10);
        assert!(reg.update(&Uuid::new_v4(), |_| ()).is_none());
    }

    #[test]
    fn ttl_purges_only_finished_jobs() {
        let reg = StatusRegistry::new(RetentionPolicy {
            ttl: Some(Duration::ZERO),
            max_jobs: None,
        });
        let active = Job::new(Uuid::new_v4(), "active");
        let active_id = active.id;
        let mut old = finished("old");
        old.finished_at = Some(Utc::now() - chrono::Duration::seconds(5));
        reg.jobs.insert(old.id, old);
        reg.jobs.insert(active_id, active);

        assert_eq!(reg.purge_expired(), 1);
        assert_eq!(reg.len(), 1);
        assert!(reg.get(&active_id).is_some());
    }

    #[test]
    fn capacity_evicts_oldest_finished_first() {
        let reg = StatusRegistry::new(RetentionPolicy {
            ttl: None,
            max_jobs: Some(2),
        });
        let mut oldest = finished("a");
        oldest.finished_at = Some(Utc::now() - chrono::Duration::seconds(60));
        let oldest_id = oldest.id;
        let newer = finished("b");
        let newer_id = newer.id;
        reg.insert(oldest);
        reg.insert(newer);
        reg.insert(Job::new(Uuid::new_v4(), "c"));

        assert_eq!(reg.len(), 2);
        assert!(reg.get(&oldest_id).is_none());
        assert!(reg.get(&newer_id).is_some());
    }

    #[test]
    fn capacity_never_evicts_active_jobs() {
        let reg = StatusRegistry::new(RetentionPolicy {
            ttl: None,
            max_jobs: Some(1),
        });
        reg.insert(Job::new(Uuid::new_v4(), "a"));
        reg.insert(Job::new(Uuid::new_v4(), "b"));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.active_count(), 2);
    }

    #[test]
    fn list_is_oldest_first() {
        let reg = StatusRegistry::new(RetentionPolicy::unbounded());
        let mut first = Job::new(Uuid::new_v4(), "first");
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        reg.insert(Job::new(Uuid::new_v4(), "second"));
        reg.insert(first);
        let docs: Vec<_> = reg.list().into_iter().map(|j| j.document_id).collect();
        assert_eq!(docs, vec!["first", "second"]);
    }
}
