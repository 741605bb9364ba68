//! Progress bridge
//!
//! A long-lived per-job subscriber that relays progress transitions to an
//! external live-update channel (a websocket session, an SSE writer, a CLI
//! watcher) until a terminal state is observed.
//!
//! Ordering matters: the bridge subscribes first, then fetches the stored
//! snapshot, so a late subscriber immediately sees already-published state
//! (including a terminal snapshot for an already-finished job). A receive
//! timeout triggers a direct re-poll of the snapshot key to cover the
//! publish/subscribe race where a transition landed before the subscription
//! was active.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use futures::StreamExt;

use super::snapshot::ProgressSnapshot;
use super::store::{ProgressStore, ProgressStoreError};

/// Default interval before falling back to a snapshot re-poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct ProgressBridge {
    store: Arc<dyn ProgressStore>,
    poll_interval: Duration,
}

impl ProgressBridge {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Relay snapshots for one job into `forward` until a terminal snapshot
    /// is forwarded, the forward channel closes, or the store becomes
    /// unreachable. Bridges for different jobs are fully independent.
    pub async fn run(
        &self,
        job_id: &str,
        forward: mpsc::Sender<ProgressSnapshot>,
    ) -> Result<(), ProgressStoreError> {
        // Subscribe before the initial fetch so no transition can fall
        // between the two.
        let mut stream = self.store.subscribe(job_id).await?;
        let mut last: Option<ProgressSnapshot> = None;

        if let Some(snapshot) = self.store.fetch(job_id).await? {
            if Self::forward_one(&forward, &snapshot).await.is_break() {
                return Ok(());
            }
            last = Some(snapshot);
        }

        loop {
            match timeout(self.poll_interval, stream.next()).await {
                Ok(Some(snapshot)) => {
                    if Self::forward_one(&forward, &snapshot).await.is_break() {
                        return Ok(());
                    }
                    last = Some(snapshot);
                },
                Ok(None) => {
                    debug!(job_id, "progress channel closed; bridge stopping");
                    return Ok(());
                },
                Err(_) => {
                    // Nothing published within the interval; re-poll the key
                    // in case a transition raced the subscription.
                    match self.store.fetch(job_id).await {
                        Ok(Some(snapshot)) if last.as_ref() != Some(&snapshot) => {
                            if Self::forward_one(&forward, &snapshot).await.is_break() {
                                return Ok(());
                            }
                            last = Some(snapshot);
                        },
                        Ok(_) => {},
                        Err(e) => {
                            warn!(job_id, error = %e, "progress store unreachable; bridge stopping");
                            return Ok(());
                        },
                    }
                },
            }
        }
    }

    /// Forward one snapshot. Breaks when the receiver is gone or the
    /// snapshot is terminal.
    async fn forward_one(
        forward: &mpsc::Sender<ProgressSnapshot>,
        snapshot: &ProgressSnapshot,
    ) -> std::ops::ControlFlow<()> {
        let terminal = snapshot.status.is_terminal();
        if forward.send(snapshot.clone()).await.is_err() {
            return std::ops::ControlFlow::Break(());
        }
        if terminal {
            return std::ops::ControlFlow::Break(());
        }
        std::ops::ControlFlow::Continue(())
    }
}
