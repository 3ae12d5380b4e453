use std::time::Duration;

use super::*;

#[test]
fn default_watcher_config_is_valid() {
    assert!(WatcherConfig::default().validate().is_ok());
}

#[test]
fn zero_poll_interval_is_rejected() {
    let config = WatcherConfig {
        poll_interval_ms: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn zero_buffers_are_rejected() {
    let config = WatcherConfig {
        command_buffer_size: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = WatcherConfig {
        reader_buffer_size: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = WatcherConfig {
        max_batch_size: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn poll_interval_converts_to_duration() {
    let config = WatcherConfig {
        poll_interval_ms: 20,
        ..Default::default()
    };
    assert_eq!(config.poll_interval(), Duration::from_millis(20));
}

#[test]
fn backoff_delay_doubles_and_caps() {
    let policy = BackoffPolicy {
        max_retries: 5,
        base_delay_ms: 10,
        max_delay_ms: 50,
    };

    assert_eq!(policy.delay_for(0), Duration::from_millis(10));
    assert_eq!(policy.delay_for(1), Duration::from_millis(20));
    assert_eq!(policy.delay_for(2), Duration::from_millis(40));
    assert_eq!(policy.delay_for(3), Duration::from_millis(50));
    assert_eq!(policy.delay_for(200), Duration::from_millis(50));
}

#[test]
fn zero_max_retries_means_unlimited() {
    let policy = BackoffPolicy {
        max_retries: 0,
        ..Default::default()
    };
    assert!(policy.allows_retry(10_000));

    let policy = BackoffPolicy {
        max_retries: 2,
        ..Default::default()
    };
    assert!(policy.allows_retry(1));
    assert!(!policy.allows_retry(2));
}
