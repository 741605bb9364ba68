//! Job progress tracker
//!
//! One tracker per running job. It owns the job's snapshot, enforces the
//! state machine (invalid transitions are rejected, not coerced) and keeps
//! counters monotone. Every accepted transition is written to the progress
//! store; a store failure is logged and swallowed so a job never fails just
//! because progress reporting did.

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use super::snapshot::{JobStatus, ProgressSnapshot, ProgressUpdate};
use super::store::ProgressStore;

/// Rejected state transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid job state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

pub struct JobTracker {
    store: Arc<dyn ProgressStore>,
    snapshot: ProgressSnapshot,
}

impl JobTracker {
    pub fn new(store: Arc<dyn ProgressStore>, job_id: &str) -> Self {
        Self {
            store,
            snapshot: ProgressSnapshot::pending(job_id),
        }
    }

    /// Current snapshot as last written.
    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Publish the initial PENDING snapshot. Not a transition; callable only
    /// while still pending.
    pub async fn begin(&mut self, message: impl Into<String>) -> Result<(), InvalidTransition> {
        if self.snapshot.status != JobStatus::Pending {
            return Err(InvalidTransition {
                from: self.snapshot.status,
                to: JobStatus::Pending,
            });
        }
        self.snapshot.message = Some(message.into());
        self.write().await;
        Ok(())
    }

    /// Record a batch completion: move to PROGRESS with updated counters.
    pub async fn advance(
        &mut self,
        update: ProgressUpdate,
        message: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Progress)?;

        // Counters are monotone within one job; a lagging update never
        // rolls a published value back.
        self.snapshot.current = self.snapshot.current.max(update.current);
        self.snapshot.total = self.snapshot.total.max(update.total);
        self.snapshot.created = self.snapshot.created.max(update.created);
        self.snapshot.updated = self.snapshot.updated.max(update.updated);
        self.snapshot.errors = self.snapshot.errors.max(update.errors);
        self.snapshot.percent =
            ProgressSnapshot::percent_of(self.snapshot.current, self.snapshot.total);
        self.snapshot.message = Some(message.into());

        self.write().await;
        Ok(())
    }

    /// Terminal SUCCESS. All batches processed, even if some rows errored.
    pub async fn succeed(&mut self, message: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Success)?;
        self.snapshot.percent = 100;
        self.snapshot.message = Some(message.into());
        self.snapshot.error = None;
        self.write().await;
        Ok(())
    }

    /// Terminal FAILURE with a human-readable error.
    pub async fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Failure)?;
        let error = error.into();
        self.snapshot.message = Some("Job failed".to_string());
        self.snapshot.error = Some(error);
        self.write().await;
        Ok(())
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), InvalidTransition> {
        if !self.snapshot.status.can_transition_to(to) {
            return Err(InvalidTransition {
                from: self.snapshot.status,
                to,
            });
        }
        self.snapshot.status = to;
        Ok(())
    }

    async fn write(&self) {
        if let Err(e) = self.store.put(&self.snapshot).await {
            warn!(
                job_id = %self.snapshot.job_id,
                status = %self.snapshot.status,
                error = %e,
                "failed to write progress snapshot; continuing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::store::MemoryProgressStore;

    fn update(current: u64, total: u64) -> ProgressUpdate {
        ProgressUpdate {
            current,
            total,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_writes_snapshots() {
        let store = Arc::new(MemoryProgressStore::new());
        let mut tracker = JobTracker::new(store.clone(), "job-1");

        tracker.begin("Starting import").await.unwrap();
        assert_eq!(
            store.fetch("job-1").await.unwrap().unwrap().status,
            JobStatus::Pending
        );

        tracker.advance(update(500, 2000), "Processed 500/2000").await.unwrap();
        let snap = store.fetch("job-1").await.unwrap().unwrap();
        assert_eq!(snap.status, JobStatus::Progress);
        assert_eq!(snap.percent, 25);

        tracker.succeed("Import completed").await.unwrap();
        let snap = store.fetch("job-1").await.unwrap().unwrap();
        assert_eq!(snap.status, JobStatus::Success);
        assert_eq!(snap.percent, 100);
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_counters_are_monotone() {
        let store = Arc::new(MemoryProgressStore::new());
        let mut tracker = JobTracker::new(store, "job-1");

        tracker.advance(update(1000, 2000), "batch 1").await.unwrap();
        tracker.advance(update(400, 2000), "stale").await.unwrap();

        assert_eq!(tracker.snapshot().current, 1000);
        assert_eq!(tracker.snapshot().percent, 50);
    }

    #[tokio::test]
    async fn test_terminal_states_reject_further_transitions() {
        let store = Arc::new(MemoryProgressStore::new());
        let mut tracker = JobTracker::new(store, "job-1");

        tracker.succeed("done").await.unwrap();

        let err = tracker.advance(update(1, 1), "late").await.unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: JobStatus::Success,
                to: JobStatus::Progress,
            }
        );
        assert!(tracker.fail("boom").await.is_err());
    }

    #[tokio::test]
    async fn test_failure_records_error_detail() {
        let store = Arc::new(MemoryProgressStore::new());
        let mut tracker = JobTracker::new(store.clone(), "job-1");

        tracker.begin("start").await.unwrap();
        tracker.fail("Missing required columns: name").await.unwrap();

        let snap = store.fetch("job-1").await.unwrap().unwrap();
        assert_eq!(snap.status, JobStatus::Failure);
        assert_eq!(snap.error.as_deref(), Some("Missing required columns: name"));
    }

    #[tokio::test]
    async fn test_begin_after_start_rejected() {
        let store = Arc::new(MemoryProgressStore::new());
        let mut tracker = JobTracker::new(store, "job-1");

        tracker.advance(update(1, 2), "batch").await.unwrap();
        assert!(tracker.begin("again").await.is_err());
    }
}
