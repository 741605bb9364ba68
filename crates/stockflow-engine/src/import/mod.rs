//! CSV product import: normalization rules and the chunked import engine.

pub mod engine;
pub mod normalize;

pub use engine::{
    CsvImportEngine, ImportError, ImportReport, ImportStats, NullSink, ProgressSink,
    DEFAULT_BATCH_SIZE, MAX_ERROR_DETAILS,
};
pub use normalize::{NormalizedProduct, RawRow, RowError};
