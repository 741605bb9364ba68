//! Event bus
//!
//! Lifecycle events are submitted explicitly and dispatched by a single
//! background task, so callers can observe whether an event was accepted
//! instead of firing detached tasks that vanish on failure.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::models::WebhookEvent;

/// Consumes dispatched events. Implemented by the webhook engine.
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    /// Returns the number of successful deliveries.
    async fn notify(&self, event: WebhookEvent, data: &Value) -> anyhow::Result<usize>;
}

/// One submitted lifecycle event.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub event: WebhookEvent,
    pub data: Value,
}

/// Cheap cloneable handle for submitting events.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl EventBus {
    /// Submit an event for dispatch. Returns false once the dispatcher has
    /// shut down; the caller decides whether that matters.
    pub fn submit(&self, event: WebhookEvent, data: Value) -> bool {
        let accepted = self.tx.send(EventEnvelope { event, data }).is_ok();
        if !accepted {
            warn!(event = %event, "event dropped, dispatcher is not running");
        }
        accepted
    }
}

/// Start the dispatch loop. The loop ends when every `EventBus` handle is
/// dropped; the join handle lets the worker drain remaining events on
/// shutdown.
pub fn spawn_dispatcher(
    notifier: std::sync::Arc<dyn WebhookNotifier>,
) -> (EventBus, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<EventEnvelope>();

    let handle = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match notifier.notify(envelope.event, &envelope.data).await {
                Ok(delivered) => {
                    info!(event = %envelope.event, delivered, "event dispatched");
                },
                Err(e) => {
                    error!(event = %envelope.event, error = %e, "event dispatch failed");
                },
            }
        }
        info!("event dispatcher stopped");
    });

    (EventBus { tx }, handle)
}
