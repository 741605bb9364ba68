//! Webhook persistence seam.
//!
//! The engine touches webhook rows only through this trait so the fan-out
//! and accounting logic is testable without Postgres.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Webhook, WebhookDeliveryLog, WebhookEvent};

#[derive(Debug, Error)]
pub enum WebhookStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("webhook not found: {0}")]
    NotFound(Uuid),
}

/// Stats deltas recorded after one delivery (all attempts folded in).
#[derive(Debug, Clone)]
pub struct StatsUpdate {
    pub success: bool,
    /// Set on failure, cleared on success.
    pub last_error: Option<String>,
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Active webhooks subscribed to `event`.
    async fn list_active_by_event(
        &self,
        event: WebhookEvent,
    ) -> Result<Vec<Webhook>, WebhookStoreError>;

    async fn get(&self, id: Uuid) -> Result<Webhook, WebhookStoreError>;

    /// Increment the success or failure counter and stamp
    /// `last_triggered_at`. `last_error` is overwritten either way.
    async fn update_stats(&self, id: Uuid, update: StatsUpdate)
        -> Result<(), WebhookStoreError>;

    async fn insert_log(&self, log: NewDeliveryLog) -> Result<(), WebhookStoreError>;

    /// Newest-first page of delivery logs, with the total count.
    async fn list_logs(
        &self,
        webhook_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WebhookDeliveryLog>, i64), WebhookStoreError>;
}

/// Insertable delivery log row; id and created_at are assigned by the
/// database.
#[derive(Debug, Clone)]
pub struct NewDeliveryLog {
    pub webhook_id: Uuid,
    pub event: WebhookEvent,
    pub payload: Value,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub response_time_ms: i64,
    pub error: Option<String>,
}

pub struct PgWebhookStore {
    pool: PgPool,
}

impl PgWebhookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookStore for PgWebhookStore {
    async fn list_active_by_event(
        &self,
        event: WebhookEvent,
    ) -> Result<Vec<Webhook>, WebhookStoreError> {
        let webhooks = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT id, url, events, is_active, secret, description, headers,
                   retry_count, timeout_seconds, last_triggered_at, last_error,
                   success_count, failure_count, created_at, updated_at
            FROM webhooks
            WHERE is_active = TRUE AND $1 = ANY(events)
            ORDER BY created_at
            "#,
        )
        .bind(event.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(webhooks)
    }

    async fn get(&self, id: Uuid) -> Result<Webhook, WebhookStoreError> {
        sqlx::query_as::<_, Webhook>(
            r#"
            SELECT id, url, events, is_active, secret, description, headers,
                   retry_count, timeout_seconds, last_triggered_at, last_error,
                   success_count, failure_count, created_at, updated_at
            FROM webhooks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(WebhookStoreError::NotFound(id))
    }

    async fn update_stats(
        &self,
        id: Uuid,
        update: StatsUpdate,
    ) -> Result<(), WebhookStoreError> {
        let result = if update.success {
            sqlx::query(
                r#"
                UPDATE webhooks
                SET success_count = success_count + 1,
                    last_triggered_at = $2,
                    last_error = NULL,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE webhooks
                SET failure_count = failure_count + 1,
                    last_triggered_at = $2,
                    last_error = $3,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(Utc::now())
            .bind(update.last_error)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(WebhookStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn insert_log(&self, log: NewDeliveryLog) -> Result<(), WebhookStoreError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_delivery_logs
                (webhook_id, event, payload, status_code, response_body,
                 response_time_ms, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(log.webhook_id)
        .bind(log.event.as_str())
        .bind(Json(log.payload))
        .bind(log.status_code)
        .bind(log.response_body)
        .bind(log.response_time_ms)
        .bind(log.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_logs(
        &self,
        webhook_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WebhookDeliveryLog>, i64), WebhookStoreError> {
        let logs = sqlx::query_as::<_, WebhookDeliveryLog>(
            r#"
            SELECT id, webhook_id, event, payload, status_code, response_body,
                   response_time_ms, error, created_at
            FROM webhook_delivery_logs
            WHERE ($1::uuid IS NULL OR webhook_id = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(webhook_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM webhook_delivery_logs
            WHERE ($1::uuid IS NULL OR webhook_id = $1)
            "#,
        )
        .bind(webhook_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((logs, total.0))
    }
}
