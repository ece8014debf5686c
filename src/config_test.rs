//! Tests for configuration validation and resolution

use std::time::Duration;

use crate::config::{BackpressurePolicy, LoggerConfig, DEFAULT_FLUSH_INTERVAL};
use crate::error::Error;

#[test]
fn test_defaults() {
    let config = LoggerConfig::new("app.log");
    assert_eq!(config.buffer_size, 1024);
    assert_eq!(config.backpressure, BackpressurePolicy::Fallback);
    assert_eq!(config.flush_interval, DEFAULT_FLUSH_INTERVAL);
    assert_eq!(config.retry_count, 3);
    assert_eq!(config.retry_delay, Duration::from_millis(10));
    assert_eq!(config.file_mode, 0o644);
    assert!(!config.async_mode);
    assert!(!config.compress);
}

#[test]
fn test_empty_filename_rejected() {
    let err = LoggerConfig::default().resolve().unwrap_err();
    assert!(matches!(err, Error::EmptyFilename));
}

#[test]
fn test_conflicting_size_forms_rejected() {
    let err = LoggerConfig::new("app.log")
        .with_max_size_bytes(1024)
        .with_max_size("1MB")
        .resolve()
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingConfig { .. }));
}

#[test]
fn test_conflicting_age_forms_rejected() {
    let err = LoggerConfig::new("app.log")
        .with_max_age(Duration::from_secs(3600))
        .with_max_age_str("1h")
        .resolve()
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingConfig { .. }));
}

#[test]
fn test_string_forms_resolve() {
    let settings = LoggerConfig::new("app.log")
        .with_max_size("1KB")
        .with_max_age_str("200ms")
        .resolve()
        .unwrap();
    assert_eq!(settings.max_size_bytes, 1024);
    assert_eq!(settings.max_age, Duration::from_millis(200));
}

#[test]
fn test_unparseable_strings_rejected() {
    assert!(matches!(
        LoggerConfig::new("app.log").with_max_size("banana").resolve(),
        Err(Error::InvalidSize { .. })
    ));
    assert!(matches!(
        LoggerConfig::new("app.log")
            .with_max_age_str("banana")
            .resolve(),
        Err(Error::InvalidDuration { .. })
    ));
}

#[test]
fn test_zero_values_fall_back_to_defaults() {
    let settings = LoggerConfig::new("app.log")
        .with_buffer_size(0)
        .with_flush_interval(Duration::ZERO)
        .with_retry(0, Duration::ZERO)
        .with_file_mode(0)
        .resolve()
        .unwrap();
    assert_eq!(settings.buffer_size, 1024);
    assert_eq!(settings.flush_interval, DEFAULT_FLUSH_INTERVAL);
    assert_eq!(settings.retry.attempts, 3);
    assert_eq!(settings.retry.delay, Duration::from_millis(10));
    assert_eq!(settings.file_mode, 0o644);
}

#[test]
fn test_disabled_thresholds_resolve_to_zero() {
    let settings = LoggerConfig::new("app.log").resolve().unwrap();
    assert_eq!(settings.max_size_bytes, 0);
    assert!(settings.max_age.is_zero());
    assert!(settings.max_file_age.is_zero());
    assert_eq!(settings.max_backups, 0);
}

// ============================================================================
// presets
// ============================================================================

#[test]
fn test_production_preset() {
    let settings = LoggerConfig::production("app.log").resolve().unwrap();
    assert_eq!(settings.max_size_bytes, 100 * 1024 * 1024);
    assert_eq!(settings.max_age, Duration::from_secs(7 * 86_400));
    assert_eq!(settings.max_backups, 10);
    assert!(settings.compress);
    assert!(settings.async_mode);
    assert!(settings.local_time);
    assert_eq!(settings.backpressure, BackpressurePolicy::Adaptive);
}

#[test]
fn test_daily_preset() {
    let settings = LoggerConfig::daily("daily.log").resolve().unwrap();
    assert_eq!(settings.max_size_bytes, 50 * 1024 * 1024);
    assert_eq!(settings.max_age, Duration::from_secs(86_400));
    assert_eq!(settings.max_backups, 7);
}

#[test]
fn test_weekly_preset() {
    let settings = LoggerConfig::weekly("weekly.log").resolve().unwrap();
    assert_eq!(settings.max_size_bytes, 200 * 1024 * 1024);
    assert_eq!(settings.max_age, Duration::from_secs(7 * 86_400));
    assert_eq!(settings.max_backups, 4);
}

#[test]
fn test_development_preset() {
    let settings = LoggerConfig::development("debug.log").resolve().unwrap();
    assert_eq!(settings.max_size_bytes, 10 * 1024 * 1024);
    assert_eq!(settings.max_age, Duration::from_secs(3600));
    assert!(!settings.compress);
    assert!(!settings.async_mode);
    assert_eq!(settings.backpressure, BackpressurePolicy::Fallback);
}

// ============================================================================
// serde
// ============================================================================

#[test]
fn test_deserialize_from_json() {
    let config: LoggerConfig = serde_json::from_str(
        r#"{
            "filename": "svc.log",
            "max_size": "25MB",
            "max_age_str": "12h",
            "max_backups": 4,
            "compress": true,
            "async": true,
            "backpressure": "adaptive",
            "flush_interval": "2ms"
        }"#,
    )
    .unwrap();

    assert!(config.async_mode);
    assert_eq!(config.backpressure, BackpressurePolicy::Adaptive);
    assert_eq!(config.flush_interval, Duration::from_millis(2));

    let settings = config.resolve().unwrap();
    assert_eq!(settings.max_size_bytes, 25 * 1024 * 1024);
    assert_eq!(settings.max_age, Duration::from_secs(12 * 3600));
    assert_eq!(settings.max_backups, 4);
}
