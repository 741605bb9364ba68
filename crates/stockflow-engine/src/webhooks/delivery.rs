//! Single-endpoint webhook delivery with bounded retries.
//!
//! One `deliver` call drives every attempt against one endpoint and returns
//! a single consolidated outcome; the caller records it exactly once.

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::signature::sign;
use crate::models::{Webhook, WebhookEvent};

pub const EVENT_HEADER: &str = "X-Webhook-Event";
const WEBHOOK_USER_AGENT: &str = "Stockflow-Webhook/1.0";

/// Retry counts beyond this are clamped; total attempts = retry_count + 1.
pub const MAX_RETRIES: i32 = 10;

/// Stored response bodies are truncated to this many characters.
pub const MAX_RESPONSE_BODY_CHARS: usize = 1000;

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Consolidated result of all attempts against one endpoint.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub success: bool,
    /// Status of the last attempt that got an HTTP response.
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    /// Time spent in HTTP attempts, summed, excluding backoff waits.
    pub response_time_ms: i64,
    pub error: Option<String>,
    pub attempts: u32,
}

pub struct WebhookDeliverer {
    http: reqwest::Client,
    backoff_base: Duration,
}

impl Default for WebhookDeliverer {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookDeliverer {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Test hook: shrink the exponential backoff base.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Deliver `event` with `data` to one webhook, retrying per its
    /// configuration. Never returns Err; all failure modes fold into the
    /// outcome.
    pub async fn deliver(
        &self,
        webhook: &Webhook,
        event: WebhookEvent,
        data: &Value,
    ) -> DeliveryOutcome {
        let envelope = json!({
            "event": event.as_str(),
            "timestamp": Utc::now().to_rfc3339(),
            "data": data,
        });
        // Serialize once so the signed bytes and the sent bytes are the
        // same value.
        let body = envelope.to_string().into_bytes();
        let headers = self.build_headers(webhook, event, &body);
        let timeout = request_timeout(webhook.timeout_seconds);
        let max_retries = webhook.retry_count.clamp(0, MAX_RETRIES) as u32;

        let mut last_status: Option<i32> = None;
        let mut last_body: Option<String> = None;
        let mut last_error: Option<String> = None;
        let mut elapsed_ms: i64 = 0;
        let mut attempts: u32 = 0;

        for attempt in 0..=max_retries {
            attempts = attempt + 1;
            let started = Instant::now();

            let result = self
                .http
                .post(&webhook.url)
                .headers(headers.clone())
                .timeout(timeout)
                .body(body.clone())
                .send()
                .await;

            elapsed_ms += started.elapsed().as_millis() as i64;

            match result {
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status.as_u16() as i32);
                    last_body = Some(truncate_chars(
                        &response.text().await.unwrap_or_default(),
                        MAX_RESPONSE_BODY_CHARS,
                    ));

                    if status.is_success() {
                        debug!(
                            webhook_id = %webhook.id,
                            event = %event,
                            status = status.as_u16(),
                            attempt = attempts,
                            "webhook delivered"
                        );
                        return DeliveryOutcome {
                            success: true,
                            status_code: last_status,
                            response_body: last_body,
                            response_time_ms: elapsed_ms,
                            error: None,
                            attempts,
                        };
                    }

                    last_error = Some(format!("HTTP {}", status.as_u16()));
                },
                Err(e) => {
                    last_status = None;
                    last_body = None;
                    last_error = Some(e.to_string());
                },
            }

            if attempt < max_retries {
                let delay = backoff_delay(self.backoff_base, attempt);
                warn!(
                    webhook_id = %webhook.id,
                    event = %event,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = last_error.as_deref().unwrap_or("unknown"),
                    "webhook attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            webhook_id = %webhook.id,
            event = %event,
            attempts,
            error = last_error.as_deref().unwrap_or("unknown"),
            "webhook delivery failed"
        );

        DeliveryOutcome {
            success: false,
            status_code: last_status,
            response_body: last_body,
            response_time_ms: elapsed_ms,
            error: last_error,
            attempts,
        }
    }

    /// Base headers, then custom headers (which may override the base),
    /// then the signature, which custom headers can never override.
    fn build_headers(&self, webhook: &Webhook, event: WebhookEvent, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(WEBHOOK_USER_AGENT));
        if let Ok(value) = HeaderValue::from_str(event.as_str()) {
            headers.insert(HeaderName::from_static("x-webhook-event"), value);
        }

        if let Some(custom) = &webhook.headers {
            for (name, value) in custom.iter() {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    },
                    _ => {
                        warn!(webhook_id = %webhook.id, header = %name, "skipping invalid custom header");
                    },
                }
            }
        }

        if let Some(secret) = webhook.secret.as_deref().filter(|s| !s.is_empty()) {
            if let Ok(value) = HeaderValue::from_str(&sign(secret, body)) {
                headers.insert(HeaderName::from_static("x-webhook-signature"), value);
            }
        }

        headers
    }
}

/// Exponential schedule: base * 2^attempt (1s, 2s, 4s, ... at the default
/// base).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

fn request_timeout(timeout_seconds: i32) -> Duration {
    if timeout_seconds > 0 {
        Duration::from_secs(timeout_seconds as u64)
    } else {
        Duration::from_secs(DEFAULT_TIMEOUT_SECS)
    }
}

/// Truncate on a character boundary, not a byte boundary.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
