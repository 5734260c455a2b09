use crate::support::test_config;

use delivery_service::{config::Config, models::provider::ChannelType};

/// Test: DLQ queue names derive from their origin queue
#[test]
fn test_dlq_queue_naming() {
    assert_eq!(
        Config::dlq_queue_name("notifications.push"),
        "notifications.push.dlq"
    );

    let config = test_config();
    assert_eq!(
        config.dlq_queue_names(),
        vec![
            "notifications.dlq".to_string(),
            "notifications.push.dlq".to_string(),
            "notifications.email.dlq".to_string(),
        ]
    );
}

/// Test: Channel types map to their own queues
#[test]
fn test_queue_for_channel() {
    let config = test_config();

    assert_eq!(
        config.queue_for_channel(ChannelType::Push),
        "notifications.push"
    );
    assert_eq!(
        config.queue_for_channel(ChannelType::Email),
        "notifications.email"
    );
}

/// Test: Per-provider breaker overrides take precedence over the defaults
#[test]
fn test_circuit_breaker_provider_overrides() {
    let mut config = test_config();
    config.circuit_breaker_overrides = Some(
        r#"{"fcm": {"failure_threshold": 10, "success_threshold": 4, "timeout_ms": 5000, "half_open_max_calls": 1}}"#
            .to_string(),
    );

    let fcm = config.circuit_breaker_config_for("fcm");
    assert_eq!(fcm.failure_threshold, 10);
    assert_eq!(fcm.success_threshold, 4);
    assert_eq!(fcm.timeout_ms, 5000);
    assert_eq!(fcm.half_open_max_calls, 1);

    let expo = config.circuit_breaker_config_for("expo");
    assert_eq!(expo.failure_threshold, 3);
    assert_eq!(expo.timeout_ms, 60_000);
}

/// Test: Unparseable overrides fall back to the defaults
#[test]
fn test_bad_overrides_fall_back_to_defaults() {
    let mut config = test_config();
    config.circuit_breaker_overrides = Some("{ nope".to_string());

    let fcm = config.circuit_breaker_config_for("fcm");
    assert_eq!(fcm.failure_threshold, 3);
}
