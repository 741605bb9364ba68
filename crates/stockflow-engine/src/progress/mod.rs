//! Job progress propagation
//!
//! The snapshot record and job state machine, the shared store that holds
//! and broadcasts snapshots, the tracker that jobs report through, and the
//! bridge that relays transitions to external observers.

pub mod bridge;
pub mod snapshot;
pub mod store;
pub mod tracker;

pub use bridge::ProgressBridge;
pub use snapshot::{
    progress_channel, progress_key, JobStatus, ProgressSnapshot, ProgressUpdate,
    PROGRESS_TTL_SECS,
};
pub use store::{
    MemoryProgressStore, ProgressStore, ProgressStoreError, ProgressStream, RedisProgressStore,
};
pub use tracker::{InvalidTransition, JobTracker};
