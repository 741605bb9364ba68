//! Integration tests for webhook delivery and fan-out, against a local
//! mock HTTP server.

mod common;

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{test_webhook, MemoryWebhookStore};
use stockflow_engine::models::WebhookEvent;
use stockflow_engine::webhooks::{
    signature, WebhookDeliverer, WebhookEngine, WebhookStoreError,
};

fn fast_deliverer() -> WebhookDeliverer {
    WebhookDeliverer::new().with_backoff_base(Duration::from_millis(5))
}

#[tokio::test]
async fn delivery_sends_envelope_headers_and_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("content-type", "application/json"))
        .and(header("user-agent", "Stockflow-Webhook/1.0"))
        .and(header("x-webhook-event", "product.created"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let mut webhook = test_webhook(
        &format!("{}/hook", server.uri()),
        &[WebhookEvent::ProductCreated],
    );
    webhook.secret = Some("s3cret".to_string());

    let outcome = fast_deliverer()
        .deliver(&webhook, WebhookEvent::ProductCreated, &json!({"sku": "A-1"}))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.status_code, Some(200));
    assert_eq!(outcome.response_body.as_deref(), Some("ok"));
    assert_eq!(outcome.attempts, 1);

    // The signature covers the exact bytes that were sent.
    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let sig = request
        .headers
        .get("x-webhook-signature")
        .expect("signature header")
        .to_str()
        .unwrap();
    assert!(signature::verify("s3cret", &request.body, sig));

    let envelope: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(envelope["event"], "product.created");
    assert_eq!(envelope["data"]["sku"], "A-1");
    assert!(envelope["timestamp"].is_string());
}

#[tokio::test]
async fn no_signature_header_without_a_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let webhook = test_webhook(&server.uri(), &[WebhookEvent::ProductUpdated]);
    let outcome = fast_deliverer()
        .deliver(&webhook, WebhookEvent::ProductUpdated, &json!({}))
        .await;
    assert!(outcome.success);

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("x-webhook-signature"));
}

#[tokio::test]
async fn custom_headers_are_merged_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-tenant", "acme"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut webhook = test_webhook(&server.uri(), &[WebhookEvent::ProductCreated]);
    webhook.headers = Some(sqlx::types::Json(
        [("X-Tenant".to_string(), "acme".to_string())].into_iter().collect(),
    ));

    let outcome = fast_deliverer()
        .deliver(&webhook, WebhookEvent::ProductCreated, &json!({}))
        .await;
    assert!(outcome.success);
}

#[tokio::test]
async fn custom_headers_override_defaults_but_not_the_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("user-agent", "acme-integration/2.0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut webhook = test_webhook(&server.uri(), &[WebhookEvent::ProductCreated]);
    webhook.secret = Some("s3cret".to_string());
    webhook.headers = Some(sqlx::types::Json(
        [
            ("User-Agent".to_string(), "acme-integration/2.0".to_string()),
            ("X-Webhook-Signature".to_string(), "sha256=forged".to_string()),
        ]
        .into_iter()
        .collect(),
    ));

    let outcome = fast_deliverer()
        .deliver(&webhook, WebhookEvent::ProductCreated, &json!({}))
        .await;
    assert!(outcome.success);

    // The real signature is applied after the custom headers.
    let requests = server.received_requests().await.unwrap();
    let sig = requests[0]
        .headers
        .get("x-webhook-signature")
        .expect("signature header")
        .to_str()
        .unwrap();
    assert_ne!(sig, "sha256=forged");
    assert!(signature::verify("s3cret", &requests[0].body, sig));
}

#[tokio::test]
async fn retries_until_success() {
    let server = MockServer::start().await;
    // Two failures, then success.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut webhook = test_webhook(&server.uri(), &[WebhookEvent::ProductCreated]);
    webhook.retry_count = 3;

    let outcome = fast_deliverer()
        .deliver(&webhook, WebhookEvent::ProductCreated, &json!({}))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn exhausted_retries_report_the_last_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let mut webhook = test_webhook(&server.uri(), &[WebhookEvent::ImportFailed]);
    webhook.retry_count = 3;

    let outcome = fast_deliverer()
        .deliver(&webhook, WebhookEvent::ImportFailed, &json!({}))
        .await;

    assert!(!outcome.success);
    // retry_count is additional attempts, so four in total.
    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.status_code, Some(503));
    assert_eq!(outcome.response_body.as_deref(), Some("overloaded"));
    assert_eq!(outcome.error.as_deref(), Some("HTTP 503"));
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn trigger_fans_out_only_to_matching_active_webhooks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryWebhookStore::new());
    // Subscribed and active: delivered.
    let subscribed = test_webhook(
        &format!("{}/a", server.uri()),
        &[WebhookEvent::ProductCreated],
    );
    // Wrong event: skipped.
    let other_event = test_webhook(
        &format!("{}/b", server.uri()),
        &[WebhookEvent::ProductDeleted],
    );
    // Right event but inactive: skipped.
    let mut inactive = test_webhook(
        &format!("{}/c", server.uri()),
        &[WebhookEvent::ProductCreated],
    );
    inactive.is_active = false;

    let subscribed_id = subscribed.id;
    store.add(subscribed);
    store.add(other_event);
    store.add(inactive);

    let engine = WebhookEngine::new(store.clone(), fast_deliverer());
    let delivered = engine
        .trigger(WebhookEvent::ProductCreated, &json!({"sku": "A-1"}))
        .await
        .unwrap();

    assert_eq!(delivered, 1);
    assert_eq!(store.log_count(), 1);

    let updated = store.get_sync(subscribed_id).unwrap();
    assert_eq!(updated.success_count, 1);
    assert_eq!(updated.failure_count, 0);
    assert!(updated.last_triggered_at.is_some());
    assert!(updated.last_error.is_none());
}

#[tokio::test]
async fn failed_delivery_updates_failure_stats_but_not_the_trigger() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryWebhookStore::new());
    let webhook = test_webhook(&server.uri(), &[WebhookEvent::ImportCompleted]);
    let webhook_id = webhook.id;
    store.add(webhook);

    let engine = WebhookEngine::new(store.clone(), fast_deliverer());
    let delivered = engine
        .trigger(WebhookEvent::ImportCompleted, &json!({}))
        .await
        .unwrap();

    assert_eq!(delivered, 0);
    let updated = store.get_sync(webhook_id).unwrap();
    assert_eq!(updated.failure_count, 1);
    assert_eq!(updated.last_error.as_deref(), Some("HTTP 500"));
    assert_eq!(store.log_count(), 1);
}

#[tokio::test]
async fn send_test_reaches_inactive_webhooks_and_skips_counters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryWebhookStore::new());
    let mut webhook = test_webhook(&server.uri(), &[WebhookEvent::ProductCreated]);
    webhook.is_active = false;
    let webhook_id = webhook.id;
    store.add(webhook);

    let engine = WebhookEngine::new(store.clone(), fast_deliverer());
    let outcome = engine
        .send_test(webhook_id, WebhookEvent::ProductCreated, None)
        .await
        .unwrap();

    assert!(outcome.success);
    // Test deliveries are logged but never counted.
    assert_eq!(store.log_count(), 1);
    let unchanged = store.get_sync(webhook_id).unwrap();
    assert_eq!(unchanged.success_count, 0);
    assert_eq!(unchanged.failure_count, 0);
}

#[tokio::test]
async fn send_test_unknown_webhook_is_an_error() {
    let store = Arc::new(MemoryWebhookStore::new());
    let engine = WebhookEngine::new(store, fast_deliverer());

    let err = engine
        .send_test(uuid::Uuid::new_v4(), WebhookEvent::ProductCreated, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookStoreError::NotFound(_)));
}

#[tokio::test]
async fn connection_failure_is_a_recorded_failure() {
    // Reserved port with nothing listening.
    let store = Arc::new(MemoryWebhookStore::new());
    let mut webhook = test_webhook("http://127.0.0.1:9/hook", &[WebhookEvent::ProductDeleted]);
    webhook.retry_count = 1;
    let webhook_id = webhook.id;
    store.add(webhook);

    let engine = WebhookEngine::new(store.clone(), fast_deliverer());
    let delivered = engine
        .trigger(WebhookEvent::ProductDeleted, &json!({}))
        .await
        .unwrap();

    assert_eq!(delivered, 0);
    let updated = store.get_sync(webhook_id).unwrap();
    assert_eq!(updated.failure_count, 1);
    assert!(updated.last_error.is_some());
}
