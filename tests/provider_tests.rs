use std::sync::Arc;

use anyhow::Result;

use delivery_service::{
    clients::{circuit_breaker::CircuitBreaker, rbmq::MessagePublisher},
    models::provider::ChannelType,
    providers::{
        NotificationProvider, Provider, fcm::FcmProvider, postmark::PostmarkProvider,
        sendgrid::SendGridProvider,
    },
};

use crate::support::{MemoryPublisher, StubProvider, channel_message, test_config};

fn wrap(
    stub: &Arc<StubProvider>,
    breaker: &Arc<CircuitBreaker>,
    publisher: &Arc<MemoryPublisher>,
) -> Provider {
    let inner: Arc<dyn NotificationProvider> = stub.clone();
    let sink: Arc<dyn MessagePublisher> = publisher.clone();

    Provider::new(inner, Arc::clone(breaker), sink, &test_config())
}

/// Test: A successful send emits one audit record and one success log, both
/// joined by the notification id
#[tokio::test]
async fn test_successful_send_emits_audit_and_log() -> Result<()> {
    let stub = Arc::new(StubProvider::succeeding("primary", ChannelType::Push));
    let breaker = Arc::new(CircuitBreaker::new());
    let publisher = Arc::new(MemoryPublisher::new());

    let provider = wrap(&stub, &breaker, &publisher);
    let message = channel_message("audit", ChannelType::Push);

    let response = provider.send_notification(&message).await?;

    assert!(response.success);
    assert_eq!(response.provider_name, "primary");
    assert_eq!(response.provider_request_id, "notif_audit");
    assert_eq!(response.message_id.as_deref(), Some("primary-message-id"));

    let audits = publisher.json_for("provider.audit").await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0]["provider_request_id"], "notif_audit");
    assert_eq!(audits[0]["notification_id"], "notif_audit");
    assert_eq!(audits[0]["provider_name"], "primary");
    assert!(
        audits[0]["request"].as_str().is_some_and(|r| !r.is_empty()),
        "Audit carries the string-encoded request body"
    );

    let logs = publisher.json_for("delivery.logs").await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["stage"], "provider_success");
    assert_eq!(logs[0]["status"], "success");

    Ok(())
}

/// Test: A failed send emits an audit record carrying the error but no
/// delivery log
#[tokio::test]
async fn test_failed_send_emits_audit_without_log() -> Result<()> {
    let stub = Arc::new(StubProvider::failing(
        "primary",
        ChannelType::Push,
        "connection refused",
    ));
    let breaker = Arc::new(CircuitBreaker::new());
    let publisher = Arc::new(MemoryPublisher::new());

    let provider = wrap(&stub, &breaker, &publisher);
    let message = channel_message("audit_fail", ChannelType::Push);

    let result = provider.send_notification(&message).await;
    assert!(result.is_err());

    let audits = publisher.json_for("provider.audit").await;
    assert_eq!(audits.len(), 1);
    assert!(
        audits[0]["response"]
            .as_str()
            .is_some_and(|r| r.contains("connection refused")),
        "Audit response carries the error"
    );

    let logs = publisher.json_for("delivery.logs").await;
    assert!(
        logs.is_empty(),
        "Terminal failure logging belongs to the caller, not the provider"
    );

    Ok(())
}

/// Test: A breaker denial fails before building anything and writes no audit
#[tokio::test]
async fn test_breaker_denial_writes_no_audit() -> Result<()> {
    let stub = Arc::new(StubProvider::succeeding("primary", ChannelType::Push));
    let breaker = Arc::new(CircuitBreaker::new());
    let publisher = Arc::new(MemoryPublisher::new());

    let config = test_config();
    let breaker_config = config.circuit_breaker_config_for("primary");

    for _ in 0..breaker_config.failure_threshold {
        breaker.record_failure("primary", &breaker_config);
    }

    let provider = wrap(&stub, &breaker, &publisher);
    let message = channel_message("denied", ChannelType::Push);

    let result = provider.send_notification(&message).await;

    let error = result.expect_err("breaker should deny");
    assert_eq!(error.to_string(), "Circuit breaker is open for primary");

    assert_eq!(stub.calls(), 0);
    assert!(publisher.json_for("provider.audit").await.is_empty());
    assert!(publisher.json_for("delivery.logs").await.is_empty());

    Ok(())
}

/// Test: Repeated failures through the wrapper trip the breaker
#[tokio::test]
async fn test_repeated_failures_trip_breaker() -> Result<()> {
    let stub = Arc::new(StubProvider::failing(
        "primary",
        ChannelType::Push,
        "request timeout",
    ));
    let breaker = Arc::new(CircuitBreaker::new());
    let publisher = Arc::new(MemoryPublisher::new());

    let provider = wrap(&stub, &breaker, &publisher);
    let message = channel_message("tripping", ChannelType::Push);

    let threshold = test_config().circuit_breaker_failure_threshold;

    for _ in 0..threshold {
        let _ = provider.send_notification(&message).await;
    }

    // The breaker is now open; this attempt must not reach the stub.
    let result = provider.send_notification(&message).await;
    assert!(result.is_err());
    assert_eq!(stub.calls(), threshold);

    Ok(())
}

/// Test: Email request builders refuse messages without a subject
#[test]
fn test_email_providers_require_subject() {
    let config = test_config();

    let mut message = channel_message("no_subject", ChannelType::Email);
    message.subject = None;

    let sendgrid = SendGridProvider::new(&config);
    let postmark = PostmarkProvider::new(&config);

    let sendgrid_err = sendgrid.build_request(&message).expect_err("no subject");
    assert_eq!(sendgrid_err.to_string(), "Email subject is required");

    let postmark_err = postmark.build_request(&message).expect_err("no subject");
    assert_eq!(postmark_err.to_string(), "Email subject is required");
}

/// Test: SendGrid requests carry recipient, sender, and subject
#[test]
fn test_sendgrid_request_shape() -> Result<()> {
    let config = test_config();
    let provider = SendGridProvider::new(&config);

    let message = channel_message("shape", ChannelType::Email);
    let request = provider.build_request(&message)?;

    assert_eq!(
        request["personalizations"][0]["to"][0]["email"],
        "user_shape@example.com"
    );
    assert_eq!(request["from"]["email"], "noreply@example.com");
    assert_eq!(request["subject"], "Welcome aboard");
    assert_eq!(request["content"][0]["value"], "Hello and welcome");

    Ok(())
}

/// Test: FCM push requests fall back to the event name when no subject was
/// rendered
#[test]
fn test_fcm_request_title_fallback() -> Result<()> {
    let config = test_config();
    let provider = FcmProvider::new(&config);

    let message = channel_message("push_shape", ChannelType::Push);
    assert!(message.subject.is_none());

    let request = provider.build_request(&message)?;

    assert_eq!(request["message"]["token"], "device_token_push_shape");
    assert_eq!(
        request["message"]["notification"]["title"],
        "user_signed_up"
    );
    assert_eq!(
        request["message"]["notification"]["body"],
        "Hello and welcome"
    );

    Ok(())
}

/// Test: Postmark message ids are read from the response body
#[test]
fn test_postmark_message_id_extraction() {
    let config = test_config();
    let provider = PostmarkProvider::new(&config);

    let body = serde_json::json!({ "MessageID": "pm-123", "ErrorCode": 0 });
    assert_eq!(provider.extract_message_id(&body).as_deref(), Some("pm-123"));

    let empty = serde_json::json!({});
    assert!(provider.extract_message_id(&empty).is_none());
}
