//! In-memory store implementations shared across integration tests.
//!
//! Each test binary uses a subset of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use stockflow_engine::import::{ImportStats, NormalizedProduct, ProgressSink};
use stockflow_engine::models::{Product, Webhook, WebhookDeliveryLog, WebhookEvent};
use stockflow_engine::products::{BatchOutcome, ProductStore, ProductStoreError};
use stockflow_engine::webhooks::{
    NewDeliveryLog, StatsUpdate, WebhookStore, WebhookStoreError,
};

/// Product store backed by a map keyed by case-folded SKU.
#[derive(Default)]
pub struct MemoryProductStore {
    products: Mutex<HashMap<String, Product>>,
    /// When set, upsert_batch fails once this many batches have committed.
    fail_after_batches: Option<usize>,
    committed_batches: Mutex<usize>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(batches: usize) -> Self {
        Self {
            fail_after_batches: Some(batches),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.products.lock().unwrap().len()
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn upsert_batch(
        &self,
        batch: &[NormalizedProduct],
    ) -> Result<BatchOutcome, ProductStoreError> {
        if let Some(limit) = self.fail_after_batches {
            let mut committed = self.committed_batches.lock().unwrap();
            if *committed >= limit {
                return Err(ProductStoreError::Database(sqlx::Error::PoolClosed));
            }
            *committed += 1;
        }

        let mut products = self.products.lock().unwrap();
        let mut outcome = BatchOutcome::default();

        for row in batch {
            let key = row.sku_folded();
            let now = Utc::now();
            if let Some(existing) = products.get_mut(&key) {
                existing.name = row.name.clone();
                existing.description = row.description.clone();
                existing.active = row.active;
                existing.updated_at = now;
                outcome.updated += 1;
            } else {
                products.insert(
                    key,
                    Product {
                        id: Uuid::new_v4(),
                        sku: row.sku.clone(),
                        name: row.name.clone(),
                        description: row.description.clone(),
                        active: row.active,
                        created_at: now,
                        updated_at: now,
                    },
                );
                outcome.created += 1;
            }
        }

        Ok(outcome)
    }

    async fn delete_batch(&self, limit: i64) -> Result<u64, ProductStoreError> {
        let mut products = self.products.lock().unwrap();
        let keys: Vec<String> = products.keys().take(limit.max(0) as usize).cloned().collect();
        for key in &keys {
            products.remove(key);
        }
        Ok(keys.len() as u64)
    }

    async fn count(&self) -> Result<i64, ProductStoreError> {
        Ok(self.products.lock().unwrap().len() as i64)
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, ProductStoreError> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .get(&sku.trim().to_lowercase())
            .cloned())
    }
}

/// Progress sink that records every report it receives.
#[derive(Default)]
pub struct CapturingSink {
    pub reports: Mutex<Vec<ImportStats>>,
}

#[async_trait]
impl ProgressSink for CapturingSink {
    async fn report(&self, stats: &ImportStats) {
        self.reports.lock().unwrap().push(*stats);
    }
}

/// Webhook store over in-memory rows, mirroring the accounting rules of the
/// Postgres implementation.
#[derive(Default)]
pub struct MemoryWebhookStore {
    webhooks: Mutex<Vec<Webhook>>,
    logs: Mutex<Vec<WebhookDeliveryLog>>,
}

impl MemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, webhook: Webhook) {
        self.webhooks.lock().unwrap().push(webhook);
    }

    pub fn get_sync(&self, id: Uuid) -> Option<Webhook> {
        self.webhooks.lock().unwrap().iter().find(|w| w.id == id).cloned()
    }

    pub fn log_count(&self) -> usize {
        self.logs.lock().unwrap().len()
    }
}

#[async_trait]
impl WebhookStore for MemoryWebhookStore {
    async fn list_active_by_event(
        &self,
        event: WebhookEvent,
    ) -> Result<Vec<Webhook>, WebhookStoreError> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.is_active && w.subscribes_to(event))
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Webhook, WebhookStoreError> {
        self.get_sync(id).ok_or(WebhookStoreError::NotFound(id))
    }

    async fn update_stats(
        &self,
        id: Uuid,
        update: StatsUpdate,
    ) -> Result<(), WebhookStoreError> {
        let mut webhooks = self.webhooks.lock().unwrap();
        let webhook = webhooks
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(WebhookStoreError::NotFound(id))?;

        if update.success {
            webhook.success_count += 1;
            webhook.last_error = None;
        } else {
            webhook.failure_count += 1;
            webhook.last_error = update.last_error;
        }
        webhook.last_triggered_at = Some(Utc::now());
        webhook.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_log(&self, log: NewDeliveryLog) -> Result<(), WebhookStoreError> {
        self.logs.lock().unwrap().push(WebhookDeliveryLog {
            id: Uuid::new_v4(),
            webhook_id: log.webhook_id,
            event: log.event.as_str().to_string(),
            payload: Json(log.payload),
            status_code: log.status_code,
            response_body: log.response_body,
            response_time_ms: log.response_time_ms,
            error: log.error,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_logs(
        &self,
        webhook_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WebhookDeliveryLog>, i64), WebhookStoreError> {
        let logs = self.logs.lock().unwrap();
        let matching: Vec<WebhookDeliveryLog> = logs
            .iter()
            .filter(|l| webhook_id.is_none_or(|id| l.webhook_id == id))
            .cloned()
            .collect();
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

/// A webhook row with test-friendly defaults.
pub fn test_webhook(url: &str, events: &[WebhookEvent]) -> Webhook {
    Webhook {
        id: Uuid::new_v4(),
        url: url.to_string(),
        events: events.iter().map(|e| e.as_str().to_string()).collect(),
        is_active: true,
        secret: None,
        description: None,
        headers: None,
        retry_count: 0,
        timeout_seconds: 5,
        last_triggered_at: None,
        last_error: None,
        success_count: 0,
        failure_count: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
