//! Webhook delivery: signing, per-endpoint retries, fan-out, and
//! accounting.

pub mod delivery;
pub mod engine;
pub mod signature;
pub mod store;

pub use delivery::{DeliveryOutcome, WebhookDeliverer, MAX_RESPONSE_BODY_CHARS, MAX_RETRIES};
pub use engine::{WebhookEngine, DEFAULT_FAN_OUT_CONCURRENCY};
pub use store::{NewDeliveryLog, PgWebhookStore, StatsUpdate, WebhookStore, WebhookStoreError};
