//! Tests for the reconnect module

use std::sync::Arc;
use std::time::Duration;

use reservoir_core::{Connector, ReservoirError};
use tokio::time::Instant;

use super::*;
use crate::testing::MockConnector;

mod config_tests {
    use super::*;

    fn fixed(initial_ms: u64, max_ms: u64) -> ConnectRetryConfig {
        ConnectRetryConfig::default()
            .with_backoff_ms(initial_ms, max_ms)
            .with_jitter(false)
    }

    #[test]
    fn test_retry_config_default() {
        let config = ConnectRetryConfig::default();
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.initial_backoff(), Duration::from_millis(50));
        assert_eq!(config.max_backoff(), Duration::from_millis(2_000));
        assert!(config.jitter());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_delay_doubles_until_capped() {
        let config = fixed(50, 300);
        let delays: Vec<u64> = (0..5)
            .map(|retry| config.retry_delay(retry).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![50, 100, 200, 300, 300]);
        assert_eq!(config.retry_delay(u32::MAX), Duration::from_millis(300));
    }

    #[test]
    fn test_delay_uses_multiplier() {
        let config = fixed(10, 10_000).with_multiplier(3.0);
        assert_eq!(config.retry_delay(2), Duration::from_millis(90));
    }

    #[test]
    fn test_jitter_keeps_lower_half() {
        let config = ConnectRetryConfig::default().with_backoff_ms(400, 400);
        for _ in 0..50 {
            let delay = config.retry_delay(3);
            assert!(
                delay >= Duration::from_millis(200) && delay <= Duration::from_millis(400),
                "delay {:?} outside 200ms..=400ms",
                delay
            );
        }
        assert_eq!(config.base_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_config_rejects_zero_attempts() {
        let err = ConnectRetryConfig::new(0).validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_retry_config_rejects_inverted_backoff() {
        let err = ConnectRetryConfig::default()
            .with_backoff_ms(500, 100)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ReservoirError::Configuration(_)));
    }

    #[test]
    fn test_retry_config_rejects_shrinking_multiplier() {
        let config = ConnectRetryConfig::default().with_multiplier(0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_from_toml() {
        let config: ConnectRetryConfig = toml::from_str(
            r#"
            max_attempts = 5
            jitter = false
            "#,
        )
        .unwrap();

        assert_eq!(config.max_attempts(), 5);
        assert!(!config.jitter());
        assert_eq!(config.retry_delay(0), Duration::from_millis(50));
    }
}

mod connector_tests {
    use super::*;

    fn retrying(mock: &Arc<MockConnector>, attempts: u32) -> RetryingConnector {
        let config = ConnectRetryConfig::new(attempts)
            .with_backoff_ms(10, 100)
            .with_jitter(false);
        let inner: Arc<dyn Connector> = Arc::clone(mock) as Arc<dyn Connector>;
        RetryingConnector::new(inner, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_succeeds_first_try() {
        let mock = MockConnector::new();
        let connector = retrying(&mock, 3);

        connector.open(None).await.expect("open");
        assert_eq!(mock.attempts(), 1);
        assert_eq!(mock.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_retries_transient_failures() {
        let mock = MockConnector::new();
        mock.fail_next(2);
        let connector = retrying(&mock, 3);

        let started = Instant::now();
        connector.open(None).await.expect("open after retries");
        assert_eq!(mock.attempts(), 3);
        // 10ms + 20ms of backoff
        assert_eq!(started.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_gives_up_after_max_attempts() {
        let mock = MockConnector::new();
        mock.set_always_fail(true);
        let connector = retrying(&mock, 3);

        let err = connector.open(None).await.err().expect("open should fail");
        assert!(matches!(err, ReservoirError::Connect(_)));
        assert_eq!(mock.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_stops_before_deadline() {
        let mock = MockConnector::new();
        mock.set_always_fail(true);
        let connector = retrying(&mock, 10);

        // Room for the 10ms and 20ms delays but not the following 40ms one.
        let deadline = Instant::now() + Duration::from_millis(50);
        let err = connector
            .open(Some(deadline))
            .await
            .err()
            .expect("open should fail");
        assert!(matches!(err, ReservoirError::Connect(_)));
        assert_eq!(mock.attempts(), 3);
        assert!(Instant::now() < deadline);
    }

    #[test]
    fn test_describe_delegates() {
        let mock = MockConnector::new();
        assert_eq!(retrying(&mock, 1).describe(), "mock://test");
    }
}
