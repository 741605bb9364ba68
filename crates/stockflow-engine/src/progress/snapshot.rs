//! Progress snapshot record and job states
//!
//! The snapshot is the latest known state of a long-running job, stored
//! under `job-progress:<job_id>` with a one-hour expiry and published
//! verbatim on `job-progress-events:<job_id>`. Counters never decrease
//! within one job's lifetime.

use serde::{Deserialize, Serialize};

/// Key prefix for stored snapshots.
pub const PROGRESS_KEY_PREFIX: &str = "job-progress:";

/// Channel prefix for published transitions.
pub const PROGRESS_CHANNEL_PREFIX: &str = "job-progress-events:";

/// Snapshot expiry, applied on every write regardless of terminal state.
pub const PROGRESS_TTL_SECS: u64 = 3600;

/// Storage key for a job's snapshot.
pub fn progress_key(job_id: &str) -> String {
    format!("{PROGRESS_KEY_PREFIX}{job_id}")
}

/// Pub/sub channel for a job's transitions.
pub fn progress_channel(job_id: &str) -> String {
    format!("{PROGRESS_CHANNEL_PREFIX}{job_id}")
}

/// Job lifecycle states: PENDING -> PROGRESS (re-entrant) -> SUCCESS|FAILURE.
///
/// The legacy transient `RETRY` wire value is read as `Progress`; every
/// external consumer treats the two identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    #[serde(alias = "RETRY")]
    Progress,
    Success,
    Failure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Progress => "PROGRESS",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }

    /// Valid transitions: PENDING and PROGRESS may move to PROGRESS or a
    /// terminal state; PROGRESS may recur. Everything else is rejected.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending | JobStatus::Progress => !matches!(next, JobStatus::Pending),
            JobStatus::Success | JobStatus::Failure => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full progress record for one job, serialized as the wire/storage JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    /// Rows processed so far.
    pub current: u64,
    /// Rows expected; 0 when the count could not be determined.
    pub total: u64,
    /// Products created so far.
    pub created: u64,
    /// Products updated so far.
    pub updated: u64,
    /// Row-level errors so far.
    pub errors: u64,
    /// floor(current / total * 100) when total > 0, else 0.
    pub percent: u8,
    pub message: Option<String>,
    /// Human-readable failure detail, set on terminal FAILURE.
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// Initial PENDING snapshot for a job.
    pub fn pending(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            current: 0,
            total: 0,
            created: 0,
            updated: 0,
            errors: 0,
            percent: 0,
            message: None,
            error: None,
        }
    }

    /// Derived percentage, floored, 0 when the total is unknown.
    pub fn percent_of(current: u64, total: u64) -> u8 {
        if total == 0 {
            return 0;
        }
        ((current.min(total) * 100) / total) as u8
    }
}

/// Counter deltas applied per transition; the tracker keeps them monotone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressUpdate {
    pub current: u64,
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub errors: u64,
}
