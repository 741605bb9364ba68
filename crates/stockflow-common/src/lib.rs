//! Stockflow Common Library
//!
//! Shared infrastructure for the Stockflow workspace.
//!
//! # Overview
//!
//! Currently this crate carries one concern used by every binary in the
//! workspace:
//!
//! - **Logging**: centralized `tracing` initialization with configurable
//!   level, output target and format
//!
//! Domain types and component errors live with their components in
//! `stockflow-engine`; each seam there defines its own closed error enum.
//!
//! # Example
//!
//! ```no_run
//! use stockflow_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("worker started");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod logging;

pub use logging::{init_logging, LogConfig};
