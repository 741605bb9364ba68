//! Stockflow Engine Library
//!
//! Background processing for a product catalog: chunked CSV imports,
//! job-progress propagation over Redis, and webhook fan-out with signed
//! payloads and bounded retries.
//!
//! # Components
//!
//! - **import**: idempotent CSV product import in committed batches
//! - **progress**: job state machine, snapshot store, and live bridge
//! - **webhooks**: HMAC-signed delivery, retries, and accounting
//! - **jobs**: runners wiring the engines to tracked jobs
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use stockflow_engine::import::{CsvImportEngine, NullSink};
//! use stockflow_engine::products::PgProductStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = sqlx::PgPool::connect("postgresql://localhost/stockflow").await?;
//!     let store = Arc::new(PgProductStore::new(pool));
//!     let engine = CsvImportEngine::new(store);
//!     let report = engine.run(Path::new("products.csv"), &NullSink).await?;
//!     println!("created {} updated {}", report.stats.created, report.stats.updated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod events;
pub mod import;
pub mod jobs;
pub mod models;
pub mod products;
pub mod progress;
pub mod webhooks;
