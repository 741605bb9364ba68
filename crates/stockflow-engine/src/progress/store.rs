//! Progress store implementations
//!
//! A `ProgressStore` keeps the latest snapshot of every job under an
//! expiring key and broadcasts each transition on a per-job channel.
//! Subscribers receive only transitions published after they subscribe, so
//! consumers that need the already-published state must `fetch` at
//! subscribe time (the bridge does exactly that).
//!
//! `RedisProgressStore` is the production implementation; clients are
//! constructed explicitly and handed to each component instead of living in
//! a process-wide singleton. `MemoryProgressStore` backs tests.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use super::snapshot::{progress_channel, progress_key, ProgressSnapshot, PROGRESS_TTL_SECS};

/// Errors from snapshot storage or pub/sub transport.
#[derive(Debug, Error)]
pub enum ProgressStoreError {
    #[error("progress store unavailable: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid snapshot payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Stream of snapshots published on one job's channel.
pub type ProgressStream = BoxStream<'static, ProgressSnapshot>;

/// Shared key-value cache with expiring keys plus per-job publish/subscribe.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Store the snapshot under the job key (refreshing its TTL) and publish
    /// it on the job channel.
    async fn put(&self, snapshot: &ProgressSnapshot) -> Result<(), ProgressStoreError>;

    /// Latest stored snapshot for the job, if any is still unexpired.
    async fn fetch(&self, job_id: &str) -> Result<Option<ProgressSnapshot>, ProgressStoreError>;

    /// Subscribe to the job channel. Yields transitions published after this
    /// call; unparseable payloads are dropped with a warning.
    async fn subscribe(&self, job_id: &str) -> Result<ProgressStream, ProgressStoreError>;
}

/// Redis-backed store: SETEX + PUBLISH per transition, one dedicated pub/sub
/// connection per subscription.
pub struct RedisProgressStore {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
}

impl RedisProgressStore {
    /// Connect to Redis at the given URL.
    pub async fn connect(url: &str) -> Result<Self, ProgressStoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn put(&self, snapshot: &ProgressSnapshot) -> Result<(), ProgressStoreError> {
        let payload = serde_json::to_string(snapshot)?;
        let mut conn = self.conn.clone();

        let _: () = conn
            .set_ex(progress_key(&snapshot.job_id), payload.as_str(), PROGRESS_TTL_SECS)
            .await?;
        let _: () = conn
            .publish(progress_channel(&snapshot.job_id), payload.as_str())
            .await?;

        Ok(())
    }

    async fn fetch(&self, job_id: &str) -> Result<Option<ProgressSnapshot>, ProgressStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(progress_key(job_id)).await?;
        match raw {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn subscribe(&self, job_id: &str) -> Result<ProgressStream, ProgressStoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(progress_channel(job_id)).await?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                let payload: String = msg.get_payload().ok()?;
                match serde_json::from_str::<ProgressSnapshot>(&payload) {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        warn!(error = %e, "dropping unparseable progress message");
                        None
                    },
                }
            })
            .boxed();

        Ok(stream)
    }
}

/// In-memory store with the same contract, for tests and local runs without
/// Redis. TTL is honored on `fetch`.
pub struct MemoryProgressStore {
    ttl: Duration,
    snapshots: Mutex<HashMap<String, (ProgressSnapshot, Instant)>>,
    channels: Mutex<HashMap<String, broadcast::Sender<ProgressSnapshot>>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(PROGRESS_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshots: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Store a snapshot without publishing it, reproducing the race where a
    /// transition lands before a subscription is active. Test hook.
    pub fn put_silent(&self, snapshot: &ProgressSnapshot) {
        let mut snapshots = lock(&self.snapshots);
        snapshots.insert(snapshot.job_id.clone(), (snapshot.clone(), Instant::now()));
    }

    fn sender(&self, job_id: &str) -> broadcast::Sender<ProgressSnapshot> {
        let mut channels = lock(&self.channels);
        channels
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

impl Default for MemoryProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn put(&self, snapshot: &ProgressSnapshot) -> Result<(), ProgressStoreError> {
        self.put_silent(snapshot);
        // No subscribers is fine; the key write already happened.
        let _ = self.sender(&snapshot.job_id).send(snapshot.clone());
        Ok(())
    }

    async fn fetch(&self, job_id: &str) -> Result<Option<ProgressSnapshot>, ProgressStoreError> {
        let snapshots = lock(&self.snapshots);
        Ok(snapshots
            .get(job_id)
            .filter(|(_, written)| written.elapsed() < self.ttl)
            .map(|(snapshot, _)| snapshot.clone()))
    }

    async fn subscribe(&self, job_id: &str) -> Result<ProgressStream, ProgressStoreError> {
        let rx = self.sender(job_id).subscribe();
        let stream = BroadcastStream::new(rx)
            .filter_map(|item| async move { item.ok() })
            .boxed();
        Ok(stream)
    }
}
