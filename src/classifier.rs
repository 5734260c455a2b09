use anyhow::Error;

/// Patterns that mark an error as non-retriable. Checked before the
/// retriable list, so they win on overlap.
const NON_RETRIABLE_PATTERNS: &[&str] = &[
    "syntaxerror",
    "json",
    "parse",
    "invalid",
    "missing",
    "required",
    "unknown channel",
    "no providers",
    "not found",
    "email subject is required",
    "malformed",
    "bad request",
    "validation",
];

const RETRIABLE_PATTERNS: &[&str] = &[
    "connection",
    "timeout",
    "network",
    "econnrefused",
    "etimedout",
    "enotfound",
    "circuit breaker",
    "temporary",
    "unavailable",
    "database",
    "kafka",
    "econnreset",
    "socket",
    "retry",
];

const JSON_PARSE_PATTERNS: &[&str] = &["syntaxerror", "json", "parse", "malformed"];

const CONFIGURATION_PATTERNS: &[&str] = &["unknown channel", "no providers", "not found"];

fn error_text(error: &Error) -> String {
    // {:#} renders the whole context chain, so wrapped causes still match.
    format!("{:#}", error).to_lowercase()
}

fn matches_any(text: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| text.contains(p))
}

/// Whether redelivery of the failed message is expected to eventually
/// succeed. Errors matching neither list default to retriable, preferring to
/// give unknown failures a chance at replay over dropping them.
pub fn is_retriable(error: &Error) -> bool {
    let text = error_text(error);

    if matches_any(&text, NON_RETRIABLE_PATTERNS) {
        return false;
    }

    if matches_any(&text, RETRIABLE_PATTERNS) {
        return true;
    }

    tracing::debug!(error = %text, "Unclassified error, defaulting to retriable");
    true
}

pub fn is_json_parse_error(error: &Error) -> bool {
    matches_any(&error_text(error), JSON_PARSE_PATTERNS)
}

pub fn is_configuration_error(error: &Error) -> bool {
    matches_any(&error_text(error), CONFIGURATION_PATTERNS)
}

/// Recognizes a breaker-admission denial so the channel worker can record a
/// `circuit_breaker_open` stage instead of a generic provider failure.
pub fn is_circuit_breaker_open(error: &Error) -> bool {
    error_text(error).contains("circuit breaker is open")
}
