//! Webhook fan-out engine.
//!
//! `trigger` finds every active subscriber of an event and delivers to all
//! of them concurrently. Per-target failures are recorded and logged but
//! never fail the trigger; only a failure to enumerate subscribers does.

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::delivery::{DeliveryOutcome, WebhookDeliverer};
use super::store::{NewDeliveryLog, StatsUpdate, WebhookStore, WebhookStoreError};
use crate::models::{Webhook, WebhookEvent};

/// Concurrent in-flight deliveries per trigger.
pub const DEFAULT_FAN_OUT_CONCURRENCY: usize = 8;

pub struct WebhookEngine {
    store: Arc<dyn WebhookStore>,
    deliverer: WebhookDeliverer,
    concurrency: usize,
}

impl WebhookEngine {
    pub fn new(store: Arc<dyn WebhookStore>, deliverer: WebhookDeliverer) -> Self {
        Self {
            store,
            deliverer,
            concurrency: DEFAULT_FAN_OUT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fan `event` out to every active subscriber. Returns the number of
    /// successful deliveries.
    pub async fn trigger(
        &self,
        event: WebhookEvent,
        data: &Value,
    ) -> Result<usize, WebhookStoreError> {
        let targets = self.store.list_active_by_event(event).await?;
        if targets.is_empty() {
            info!(event = %event, "no active webhooks subscribed");
            return Ok(0);
        }

        info!(event = %event, targets = targets.len(), "triggering webhooks");

        let delivered = stream::iter(targets)
            .map(|webhook| async move {
                let outcome = self.deliverer.deliver(&webhook, event, data).await;
                let success = outcome.success;
                self.record(&webhook, event, data, outcome).await;
                success
            })
            .buffer_unordered(self.concurrency)
            .fold(0usize, |acc, success| async move {
                if success {
                    acc + 1
                } else {
                    acc
                }
            })
            .await;

        Ok(delivered)
    }

    /// Deliver a test event to one webhook, active or not. Logs the
    /// delivery but never touches the success and failure counters.
    pub async fn send_test(
        &self,
        webhook_id: Uuid,
        event: WebhookEvent,
        payload: Option<Value>,
    ) -> Result<DeliveryOutcome, WebhookStoreError> {
        let webhook = self.store.get(webhook_id).await?;
        let data = payload.unwrap_or_else(|| {
            json!({
                "test": true,
                "webhook_id": webhook_id.to_string(),
                "message": "Test webhook delivery",
            })
        });

        let outcome = self.deliverer.deliver(&webhook, event, &data).await;

        if let Err(e) = self
            .store
            .insert_log(delivery_log(&webhook, event, &data, &outcome))
            .await
        {
            warn!(webhook_id = %webhook.id, error = %e, "failed to record test delivery log");
        }

        Ok(outcome)
    }

    /// Persist the outcome: one log row per trigger plus a stats update.
    /// Accounting failures are logged and swallowed so one broken write
    /// cannot fail the fan-out.
    async fn record(
        &self,
        webhook: &Webhook,
        event: WebhookEvent,
        data: &Value,
        outcome: DeliveryOutcome,
    ) {
        if let Err(e) = self
            .store
            .insert_log(delivery_log(webhook, event, data, &outcome))
            .await
        {
            warn!(webhook_id = %webhook.id, error = %e, "failed to record delivery log");
        }

        let update = StatsUpdate {
            success: outcome.success,
            last_error: if outcome.success {
                None
            } else {
                outcome.error.clone()
            },
        };
        if let Err(e) = self.store.update_stats(webhook.id, update).await {
            warn!(webhook_id = %webhook.id, error = %e, "failed to update webhook stats");
        }
    }
}

#[async_trait::async_trait]
impl crate::events::WebhookNotifier for WebhookEngine {
    async fn notify(&self, event: WebhookEvent, data: &Value) -> anyhow::Result<usize> {
        Ok(self.trigger(event, data).await?)
    }
}

fn delivery_log(
    webhook: &Webhook,
    event: WebhookEvent,
    data: &Value,
    outcome: &DeliveryOutcome,
) -> NewDeliveryLog {
    NewDeliveryLog {
        webhook_id: webhook.id,
        event,
        payload: data.clone(),
        status_code: outcome.status_code,
        response_body: outcome.response_body.clone(),
        response_time_ms: outcome.response_time_ms,
        error: outcome.error.clone(),
    }
}
