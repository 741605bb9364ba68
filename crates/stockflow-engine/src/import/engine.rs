//! Chunked CSV import engine
//!
//! Streams a product CSV in fixed-size batches: validate the header first,
//! then per row validate -> normalize -> batch -> upsert, committing one
//! batch at a time and reporting stats to a progress sink after every
//! commit. Per-row problems never abort the file; only a structural header
//! error or a database failure does.

use async_trait::async_trait;
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::normalize::{
    fold_column, normalize_row, validate_row, NormalizedProduct, RawRow, RowError,
    REQUIRED_COLUMNS,
};
use crate::products::{ProductStore, ProductStoreError};

/// Default rows per batch; each batch commits independently.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// At most this many row errors are returned in the report.
pub const MAX_ERROR_DETAILS: usize = 100;

/// Import failures.
///
/// Row-level problems are not errors at this level; they are counted on the
/// stats and collected as `RowError` details.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Structural error: aborts before any row is processed.
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Failed to read CSV file: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A batch failed to persist; retryable by the job-level policy.
    #[error("Batch upsert failed: {0}")]
    Batch(#[from] ProductStoreError),
}

/// Running counters, pushed to the progress sink after each batch commit.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ImportStats {
    pub total_rows: u64,
    pub processed_rows: u64,
    pub created: u64,
    pub updated: u64,
    pub errors: u64,
    /// Rows the parser could not shape to the header (field-count mismatch,
    /// broken tokenization). Counted separately so they are not silently
    /// lost, and not conflated with validation errors.
    pub unparseable: u64,
}

/// Final result of one import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    #[serde(flatten)]
    pub stats: ImportStats,
    /// First `MAX_ERROR_DETAILS` row errors.
    pub error_details: Vec<RowError>,
}

/// Receives a stats snapshot after every committed batch. Implementations
/// must swallow their own failures; progress reporting must never fail an
/// import.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, stats: &ImportStats);
}

/// Sink that discards reports.
pub struct NullSink;

#[async_trait]
impl ProgressSink for NullSink {
    async fn report(&self, _stats: &ImportStats) {}
}

pub struct CsvImportEngine {
    store: Arc<dyn ProductStore>,
    batch_size: usize,
    max_error_details: usize,
}

impl CsvImportEngine {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            max_error_details: MAX_ERROR_DETAILS,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Import one CSV file, reporting to `sink` after each committed batch.
    pub async fn run(
        &self,
        path: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<ImportReport, ImportError> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(fold_column).collect();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|required| !headers.iter().any(|h| h == *required))
            .map(|required| required.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::MissingColumns(missing));
        }

        let mut stats = ImportStats {
            total_rows: count_data_rows(path),
            ..Default::default()
        };

        info!(
            path = %path.display(),
            total_rows = stats.total_rows,
            batch_size = self.batch_size,
            "starting CSV import"
        );

        let mut error_details: Vec<RowError> = Vec::new();
        let mut batch: Vec<NormalizedProduct> = Vec::with_capacity(self.batch_size);
        // Physical line numbering: header is line 1, first data row is 2.
        let mut row_number: u64 = 1;

        for record in reader.records() {
            row_number += 1;

            let record = match record {
                Ok(record) => record,
                Err(e) => match e.kind() {
                    csv::ErrorKind::Io(_) => return Err(ImportError::Csv(e)),
                    _ => {
                        stats.unparseable += 1;
                        debug!(row = row_number, error = %e, "skipping unparseable row");
                        continue;
                    },
                },
            };

            if record.len() != headers.len() {
                stats.unparseable += 1;
                debug!(
                    row = row_number,
                    fields = record.len(),
                    expected = headers.len(),
                    "skipping row with mismatched field count"
                );
                continue;
            }

            let row: RawRow = headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect();

            if let Err(message) = validate_row(&row, row_number) {
                stats.errors += 1;
                if error_details.len() < self.max_error_details {
                    error_details.push(RowError {
                        row: row_number,
                        message,
                        data: row,
                    });
                }
                continue;
            }

            batch.push(normalize_row(&row));

            if batch.len() >= self.batch_size {
                self.flush_batch(&mut batch, &mut stats, sink).await?;
            }
        }

        if !batch.is_empty() {
            self.flush_batch(&mut batch, &mut stats, sink).await?;
        }

        info!(
            processed = stats.processed_rows,
            created = stats.created,
            updated = stats.updated,
            errors = stats.errors,
            unparseable = stats.unparseable,
            "CSV import finished"
        );

        Ok(ImportReport {
            stats,
            error_details,
        })
    }

    /// Commit the accumulated batch, fold its outcome into the stats, and
    /// report. The batch is drained whether or not the caller retries.
    async fn flush_batch(
        &self,
        batch: &mut Vec<NormalizedProduct>,
        stats: &mut ImportStats,
        sink: &dyn ProgressSink,
    ) -> Result<(), ImportError> {
        let rows = std::mem::take(batch);
        let outcome = self.store.upsert_batch(&rows).await?;

        stats.created += outcome.created;
        stats.updated += outcome.updated;
        stats.processed_rows += rows.len() as u64;

        debug!(
            batch_rows = rows.len(),
            created = outcome.created,
            updated = outcome.updated,
            "batch committed"
        );

        sink.report(stats).await;
        Ok(())
    }
}

/// Count data lines (header excluded). A count failure degrades percent
/// display but never blocks the import.
fn count_data_rows(path: &Path) -> u64 {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not count rows; total unknown");
            return 0;
        },
    };

    let mut count: u64 = 0;
    for line in std::io::BufReader::new(file).lines() {
        match line {
            Ok(content) => {
                if !content.trim().is_empty() {
                    count += 1;
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not count rows; total unknown");
                return 0;
            },
        }
    }

    count.saturating_sub(1)
}
