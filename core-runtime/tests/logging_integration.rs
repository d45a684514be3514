//! Integration tests for logging system

use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LogLevel, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_logging_initializes_once_per_process() {
    // Only one global subscriber can exist, so both calls live in one test
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    init_logging(config.clone()).expect("first initialization succeeds");
    tracing::debug!(target: "core_auth", user = %redact_if_sensitive("user", "alice@example.com"), "logging ready");

    match init_logging(config) {
        Err(Error::Config(msg)) => assert!(msg.contains("Failed to initialize logging")),
        other => panic!("expected config error on second init, got {:?}", other),
    }
}

#[test]
fn test_token_fields_never_pass_through() {
    for field in ["access_token", "refresh_token", "client_secret", "client_assertion"] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]", "{}", field);
    }
}

#[test]
fn test_emails_are_masked() {
    let redacted = redact_if_sensitive("user_id", "someone@contoso.com");

    assert!(redacted.starts_with('s'));
    assert!(!redacted.contains("contoso.com"));
}

#[test]
fn test_plain_values_pass_through() {
    assert_eq!(redact_if_sensitive("item_id", "01BYE5RZ6QN3ZWBTUFOFD3GSPGOHDJD36K"), "01BYE5RZ6QN3ZWBTUFOFD3GSPGOHDJD36K");
    assert_eq!(redact_if_sensitive("status", "inProgress"), "inProgress");
}
