use anyhow::anyhow;

use delivery_service::classifier::{
    is_circuit_breaker_open, is_configuration_error, is_json_parse_error, is_retriable,
};

/// Test: Errors matching no known pattern default to retriable
#[test]
fn test_unknown_errors_default_to_retriable() {
    assert!(is_retriable(&anyhow!("Something went sideways")));
    assert!(is_retriable(&anyhow!("disk quota exceeded")));
}

/// Test: Missing-field validation errors are non-retriable
#[test]
fn test_missing_required_field_is_non_retriable() {
    assert!(!is_retriable(&anyhow!("Missing required field")));
    assert!(!is_retriable(&anyhow!("recipient is required")));
}

/// Test: Connection-level failures are retriable
#[test]
fn test_connection_errors_are_retriable() {
    assert!(is_retriable(&anyhow!("ECONNRESET")));
    assert!(is_retriable(&anyhow!("connection refused by peer")));
    assert!(is_retriable(&anyhow!("request timeout after 30s")));
    assert!(is_retriable(&anyhow!("ETIMEDOUT")));
    assert!(is_retriable(&anyhow!("socket hang up")));
}

/// Test: Non-retriable patterns win when both lists match
#[test]
fn test_non_retriable_patterns_win_on_overlap() {
    // "invalid" (non-retriable) and "connection" (retriable) both match.
    assert!(!is_retriable(&anyhow!("Invalid connection string")));
    // "json" beats "network".
    assert!(!is_retriable(&anyhow!("network response was not valid JSON")));
}

/// Test: Infrastructure errors are retriable
#[test]
fn test_infrastructure_errors_are_retriable() {
    assert!(is_retriable(&anyhow!("database connection lost")));
    assert!(is_retriable(&anyhow!("kafka broker unreachable")));
    assert!(is_retriable(&anyhow!("service temporarily unavailable")));
}

/// Test: Circuit-breaker denials are retriable and separately recognizable
#[test]
fn test_circuit_breaker_denials() {
    let error = anyhow!("Circuit breaker is open for fcm");

    assert!(is_retriable(&error));
    assert!(is_circuit_breaker_open(&error));
    assert!(!is_circuit_breaker_open(&anyhow!("connection refused")));
}

/// Test: Routing and provider-list errors classify as configuration errors
#[test]
fn test_configuration_errors_are_non_retriable() {
    let unknown_channel = anyhow!("Unknown channel: sms");
    let no_providers = anyhow!("No providers configured for channel push");

    assert!(!is_retriable(&unknown_channel));
    assert!(!is_retriable(&no_providers));
    assert!(is_configuration_error(&unknown_channel));
    assert!(is_configuration_error(&no_providers));
    assert!(!is_configuration_error(&anyhow!("ECONNRESET")));
}

/// Test: Missing email subject is non-retriable
#[test]
fn test_email_subject_required_is_non_retriable() {
    assert!(!is_retriable(&anyhow!("Email subject is required")));
}

/// Test: Parse failures classify as JSON parse errors and never replay
#[test]
fn test_json_parse_errors() {
    let error = anyhow!("Failed to parse JSON payload");

    assert!(is_json_parse_error(&error));
    assert!(!is_retriable(&error));

    let malformed = anyhow!("Malformed channel message: EOF while parsing a value");
    assert!(is_json_parse_error(&malformed));
    assert!(!is_retriable(&malformed));

    assert!(!is_json_parse_error(&anyhow!("connection refused")));
}

/// Test: Classification sees context added around a wrapped cause
#[test]
fn test_wrapped_errors_match_through_context() {
    let root = anyhow!("ECONNREFUSED");
    let wrapped = root.context("publishing channel message");

    assert!(is_retriable(&wrapped));
}
