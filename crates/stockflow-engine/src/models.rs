//! Domain models
//!
//! Row types for the product and webhook tables, and the closed set of
//! subscribable lifecycle events. Schema migrations are owned by the
//! deployment; these structs mirror the tables as they exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;

/// A product row. SKUs are unique case-insensitively (enforced by a unique
/// index on `lower(sku)`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A webhook subscription. Owned by the CRUD layer; the delivery engine
/// reads it and updates only the stats fields (`success_count`,
/// `failure_count`, `last_error`, `last_triggered_at`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Webhook {
    pub id: Uuid,
    pub url: String,
    /// Subscribed event names; non-empty.
    pub events: Vec<String>,
    pub is_active: bool,
    /// HMAC signing key; no signature header is sent without one.
    pub secret: Option<String>,
    pub description: Option<String>,
    /// Custom headers merged over the defaults on every delivery.
    pub headers: Option<Json<HashMap<String, String>>>,
    /// Additional attempts after the first (0-10).
    pub retry_count: i32,
    /// Per-attempt HTTP timeout (1-300).
    pub timeout_seconds: i32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub success_count: i64,
    pub failure_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    /// Whether this webhook subscribes to the given event.
    pub fn subscribes_to(&self, event: WebhookEvent) -> bool {
        self.events.iter().any(|e| e == event.as_str())
    }
}

/// Append-only record of one webhook triggering: the final outcome after all
/// retries, never one row per attempt. Survives webhook deletion for audit.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookDeliveryLog {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event: String,
    pub payload: Json<Value>,
    pub status_code: Option<i32>,
    /// Truncated to 1000 characters.
    pub response_body: Option<String>,
    pub response_time_ms: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The fixed, closed set of subscribable event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "product.created")]
    ProductCreated,
    #[serde(rename = "product.updated")]
    ProductUpdated,
    #[serde(rename = "product.deleted")]
    ProductDeleted,
    #[serde(rename = "import.started")]
    ImportStarted,
    #[serde(rename = "import.completed")]
    ImportCompleted,
    #[serde(rename = "import.failed")]
    ImportFailed,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::ProductCreated => "product.created",
            WebhookEvent::ProductUpdated => "product.updated",
            WebhookEvent::ProductDeleted => "product.deleted",
            WebhookEvent::ImportStarted => "import.started",
            WebhookEvent::ImportCompleted => "import.completed",
            WebhookEvent::ImportFailed => "import.failed",
        }
    }

    /// All known events, for validation and documentation surfaces.
    pub fn all() -> &'static [WebhookEvent] {
        &[
            WebhookEvent::ProductCreated,
            WebhookEvent::ProductUpdated,
            WebhookEvent::ProductDeleted,
            WebhookEvent::ImportStarted,
            WebhookEvent::ImportCompleted,
            WebhookEvent::ImportFailed,
        ]
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for event names outside the closed set.
#[derive(Debug, thiserror::Error)]
#[error("unknown webhook event: {0}")]
pub struct UnknownEvent(pub String);

impl std::str::FromStr for WebhookEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WebhookEvent::all()
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}
