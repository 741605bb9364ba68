//! Job runners
//!
//! Glue between the long-running engines and the outside world: each runner
//! drives one job kind end to end, publishing progress through a
//! `JobTracker` and lifecycle events through the `EventBus`.

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::events::EventBus;
use crate::import::{CsvImportEngine, ImportError, ImportReport, ImportStats, ProgressSink};
use crate::models::WebhookEvent;
use crate::products::{ProductStore, ProductStoreError};
use crate::progress::{InvalidTransition, JobTracker, ProgressStore, ProgressUpdate};

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Products(#[from] ProductStoreError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// Bridges batch-commit reports into the shared tracker. Report failures
/// are swallowed; progress must never abort a job.
struct TrackerSink {
    tracker: Arc<Mutex<JobTracker>>,
}

#[async_trait]
impl ProgressSink for TrackerSink {
    async fn report(&self, stats: &ImportStats) {
        let consumed = stats.processed_rows + stats.errors + stats.unparseable;
        let update = ProgressUpdate {
            current: consumed,
            total: stats.total_rows,
            created: stats.created,
            updated: stats.updated,
            errors: stats.errors,
        };
        let message = format!("Processed {consumed}/{} rows", stats.total_rows);

        let mut tracker = self.tracker.lock().await;
        if let Err(e) = tracker.advance(update, message).await {
            warn!(error = %e, "progress update rejected");
        }
    }
}

/// Runs one CSV import as a tracked job.
pub struct ImportJobRunner {
    import: CsvImportEngine,
    progress: Arc<dyn ProgressStore>,
    events: EventBus,
}

impl ImportJobRunner {
    pub fn new(
        import: CsvImportEngine,
        progress: Arc<dyn ProgressStore>,
        events: EventBus,
    ) -> Self {
        Self {
            import,
            progress,
            events,
        }
    }

    /// Run the import to completion. The job reaches SUCCESS even when
    /// individual rows errored; only file-level and database failures
    /// produce FAILURE.
    pub async fn run(&self, job_id: &str, path: &Path) -> Result<ImportReport, JobError> {
        let tracker = Arc::new(Mutex::new(JobTracker::new(self.progress.clone(), job_id)));
        tracker.lock().await.begin("Starting import").await?;

        self.events.submit(
            WebhookEvent::ImportStarted,
            json!({
                "job_id": job_id,
                "file": path.display().to_string(),
            }),
        );

        let sink = TrackerSink {
            tracker: tracker.clone(),
        };

        match self.import.run(path, &sink).await {
            Ok(report) => {
                let mut tracker = tracker.lock().await;
                // Rows rejected after the last batch flush never reached a
                // sink report; fold the final counters in before finishing.
                let consumed = report.stats.processed_rows
                    + report.stats.errors
                    + report.stats.unparseable;
                tracker
                    .advance(
                        ProgressUpdate {
                            current: consumed,
                            total: report.stats.total_rows,
                            created: report.stats.created,
                            updated: report.stats.updated,
                            errors: report.stats.errors,
                        },
                        format!("Processed {consumed}/{} rows", report.stats.total_rows),
                    )
                    .await?;
                tracker
                    .succeed(format!(
                        "Import completed: {} created, {} updated, {} errors",
                        report.stats.created, report.stats.updated, report.stats.errors
                    ))
                    .await?;

                self.events.submit(
                    WebhookEvent::ImportCompleted,
                    json!({
                        "job_id": job_id,
                        "total_rows": report.stats.total_rows,
                        "processed_rows": report.stats.processed_rows,
                        "created": report.stats.created,
                        "updated": report.stats.updated,
                        "errors": report.stats.errors,
                        "unparseable": report.stats.unparseable,
                    }),
                );

                info!(job_id, created = report.stats.created, updated = report.stats.updated, "import job finished");
                Ok(report)
            },
            Err(e) => {
                let detail = e.to_string();
                if let Err(te) = tracker.lock().await.fail(detail.clone()).await {
                    warn!(job_id, error = %te, "could not record job failure");
                }

                self.events.submit(
                    WebhookEvent::ImportFailed,
                    json!({
                        "job_id": job_id,
                        "error": detail,
                    }),
                );

                Err(e.into())
            },
        }
    }
}

/// Deletes all products in batches as a tracked job. Emits no per-product
/// events; a bulk purge is an administrative action, not product churn.
pub struct BulkDeleteJobRunner {
    products: Arc<dyn ProductStore>,
    progress: Arc<dyn ProgressStore>,
    batch_size: u64,
}

impl BulkDeleteJobRunner {
    pub fn new(products: Arc<dyn ProductStore>, progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            products,
            progress,
            batch_size: 1000,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Returns the number of deleted rows.
    pub async fn run(&self, job_id: &str) -> Result<u64, JobError> {
        let mut tracker = JobTracker::new(self.progress.clone(), job_id);
        tracker.begin("Starting bulk delete").await?;

        let total = match self.products.count().await {
            Ok(count) => count.max(0) as u64,
            Err(e) => {
                if let Err(te) = tracker.fail(e.to_string()).await {
                    warn!(job_id, error = %te, "could not record job failure");
                }
                return Err(e.into());
            },
        };
        let mut deleted: u64 = 0;

        loop {
            let removed = match self.products.delete_batch(self.batch_size as i64).await {
                Ok(removed) => removed,
                Err(e) => {
                    if let Err(te) = tracker.fail(e.to_string()).await {
                        warn!(job_id, error = %te, "could not record job failure");
                    }
                    return Err(e.into());
                },
            };
            if removed == 0 {
                break;
            }

            deleted += removed;
            tracker
                .advance(
                    ProgressUpdate {
                        current: deleted,
                        total,
                        ..Default::default()
                    },
                    format!("Deleted {deleted}/{total} products"),
                )
                .await?;
        }

        tracker.succeed(format!("Deleted {deleted} products")).await?;
        info!(job_id, deleted, "bulk delete job finished");
        Ok(deleted)
    }
}
