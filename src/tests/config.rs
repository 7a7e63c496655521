// Unit Tests for the Resilience Configuration System
//
// UNIT UNDER TEST: ResilienceConfig, RetryConfig, CircuitBreakerConfig, FallbackConfig
//
// BUSINESS RESPONSIBILITY:
//   - Supplies documented defaults for every resilience layer
//   - Loads configuration documents from JSON text, files and the environment
//   - Merges per-operation overrides field by field over the global sections
//   - Rejects invalid settings before any operation is wrapped
//
// TEST COVERAGE:
//   - Default values of each section
//   - Field-level override merge and untouched operations
//   - Validation failures for thresholds, delays and pipeline sizing
//   - Environment overrides, including invalid values
//   - Failure-kind filters following the kind hierarchy

use crate::config::{
    CircuitBreakerConfig, FallbackConfig, PipelineSettings, ResilienceConfig, RetryConfig,
    RetryStrategy,
};
use crate::core_types::Severity;
use crate::error::{ErrorKind, ResilienceError};
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

const ENV_KEYS: &[&str] = &[
    "RESILIENCE_CONFIG",
    "RESILIENCE_QUEUE_CAPACITY",
    "RESILIENCE_WORKER_COUNT",
    "RESILIENCE_LOG_ALL_ERRORS",
    "RESILIENCE_TELEMETRY_ENABLED",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[cfg(test)]
mod defaults_tests {
    use super::*;

    #[test]
    fn test_section_defaults() {
        // Arrange & Act
        let retry = RetryConfig::default();
        let breaker = CircuitBreakerConfig::default();
        let fallback = FallbackConfig::default();
        let pipeline = PipelineSettings::default();

        // Assert
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.strategy, RetryStrategy::Exponential);
        assert_eq!(retry.base_delay, Duration::from_secs(1));
        assert_eq!(retry.max_delay, Duration::from_secs(60));
        assert!(retry.jitter);
        assert_eq!(retry.max_attempts(), 4);

        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.recovery_timeout, Duration::from_secs(60));
        assert_eq!(breaker.success_threshold, 2);
        assert_eq!(breaker.timeout, Duration::from_secs(30));

        assert!(fallback.enabled);
        assert!(fallback.strategies.is_empty());
        assert_eq!(fallback.max_fallbacks, 3);

        assert_eq!(pipeline.queue_capacity, 1000);
        assert_eq!(pipeline.worker_count, 2);
        assert!(pipeline.log_all_errors);
        assert!(pipeline.telemetry_enabled);
        assert_eq!(
            pipeline.alert_severities,
            vec![Severity::Critical, Severity::High]
        );
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = ResilienceConfig::from_json_str("{}").unwrap();

        assert_eq!(config, ResilienceConfig::default());
    }
}

#[cfg(test)]
mod document_tests {
    use super::*;

    #[test]
    fn test_operation_override_merges_over_globals() {
        // Test verifies only the overridden fields change; the rest come
        // from the global section

        // Arrange
        let json = r#"{
            "global_retry": { "max_retries": 5, "strategy": "fibonacci", "base_delay": 0.5 },
            "operations": {
                "fetch_invoice": { "retry": { "max_retries": 1 } },
                "sync_ledger": { "circuit_breaker": { "failure_threshold": 2 } }
            }
        }"#;

        // Act
        let config = ResilienceConfig::from_json_str(json).unwrap();
        let resolved = config.resolve_operations().unwrap();

        // Assert
        let retry = resolved["fetch_invoice"].retry.as_ref().unwrap();
        assert_eq!(retry.max_retries, 1, "Overridden field");
        assert_eq!(retry.strategy, RetryStrategy::Fibonacci, "Inherited field");
        assert_eq!(retry.base_delay, Duration::from_millis(500), "Inherited field");
        assert!(resolved["fetch_invoice"].circuit_breaker.is_none());

        let breaker = resolved["sync_ledger"].circuit_breaker.as_ref().unwrap();
        assert_eq!(breaker.failure_threshold, 2);
        assert_eq!(breaker.recovery_timeout, Duration::from_secs(60));
        assert!(resolved["sync_ledger"].retry.is_none());
    }

    #[test]
    fn test_pipeline_settings_are_read_from_top_level() {
        let json = r#"{
            "queue_capacity": 10,
            "worker_count": 4,
            "log_all_errors": false,
            "alert_severities": ["CRITICAL"],
            "poll_interval": 0.25
        }"#;

        let config = ResilienceConfig::from_json_str(json).unwrap();

        assert_eq!(config.pipeline.queue_capacity, 10);
        assert_eq!(config.pipeline.worker_count, 4);
        assert!(!config.pipeline.log_all_errors);
        assert_eq!(config.pipeline.alert_severities, vec![Severity::Critical]);
        assert_eq!(config.pipeline.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_malformed_documents_are_configuration_errors() {
        // Arrange
        let cases = [
            "not json",
            r#"{ "global_retry": { "strategy": "linear" } }"#,
            r#"{ "operations": { "op": { "retry": 7 } } }"#,
            r#"{ "operations": { "op": { "retry": { "max_retries": "many" } } } }"#,
        ];

        for json in cases {
            // Act
            let result = ResilienceConfig::from_json_str(json);

            // Assert
            assert!(
                matches!(result, Err(ResilienceError::ConfigurationError { .. })),
                "Document should be rejected: {json}"
            );
        }
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let cases = [
            r#"{ "global_circuit_breaker": { "failure_threshold": 0 } }"#,
            r#"{ "global_circuit_breaker": { "success_threshold": 0 } }"#,
            r#"{ "global_retry": { "base_delay": 10.0, "max_delay": 1.0 } }"#,
            r#"{ "queue_capacity": 0 }"#,
            r#"{ "worker_count": 0 }"#,
            r#"{ "operations": { "op": { "circuit_breaker": { "timeout": 0.0 } } } }"#,
        ];

        for json in cases {
            let result = ResilienceConfig::from_json_str(json);
            assert!(result.is_err(), "Invalid document accepted: {json}");
        }
    }

    #[test]
    fn test_from_file_reads_document() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "global_fallback": {{ "max_fallbacks": 1 }} }}"#).unwrap();

        // Act
        let config = ResilienceConfig::from_file(file.path()).unwrap();

        // Assert
        assert_eq!(config.global_fallback.max_fallbacks, 1);
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let result = ResilienceConfig::from_file("/nonexistent/resilience.json");

        match result {
            Err(ResilienceError::ConfigurationError { message }) => {
                assert!(message.contains("cannot read configuration file"))
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }
}

#[cfg(test)]
mod env_tests {
    use super::*;

    #[test]
    #[serial]
    fn test_from_env_without_variables_uses_defaults() {
        // Arrange
        clear_env();

        // Act
        let config = ResilienceConfig::from_env().unwrap();

        // Assert
        assert_eq!(config, ResilienceConfig::default());
    }

    #[test]
    #[serial]
    fn test_env_variables_override_file() {
        // Arrange
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "queue_capacity": 50, "worker_count": 3 }}"#).unwrap();
        std::env::set_var("RESILIENCE_CONFIG", file.path());
        std::env::set_var("RESILIENCE_QUEUE_CAPACITY", "20");
        std::env::set_var("RESILIENCE_TELEMETRY_ENABLED", "false");

        // Act
        let config = ResilienceConfig::from_env();
        clear_env();

        // Assert
        let config = config.unwrap();
        assert_eq!(config.pipeline.queue_capacity, 20, "Env wins over file");
        assert_eq!(config.pipeline.worker_count, 3, "File value kept");
        assert!(!config.pipeline.telemetry_enabled);
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_is_rejected() {
        // Arrange
        clear_env();
        std::env::set_var("RESILIENCE_WORKER_COUNT", "lots");

        // Act
        let result = ResilienceConfig::from_env();
        clear_env();

        // Assert
        assert!(matches!(
            result,
            Err(ResilienceError::ConfigurationError { .. })
        ));
    }
}

#[cfg(test)]
mod behaviour_tests {
    use super::*;

    #[test]
    fn test_breaker_filters_follow_kind_hierarchy() {
        // Arrange
        let exclude_network = CircuitBreakerConfig::new().with_exclude(ErrorKind::Network);
        let include_db = CircuitBreakerConfig::new().with_include(ErrorKind::Database);

        // Act & Assert
        assert!(!exclude_network.counts_failure(ErrorKind::Timeout));
        assert!(exclude_network.counts_failure(ErrorKind::Database));
        assert!(include_db.counts_failure(ErrorKind::Database));
        assert!(!include_db.counts_failure(ErrorKind::Connection));
        assert!(
            CircuitBreakerConfig::new().counts_failure(ErrorKind::Other),
            "Empty include list counts everything"
        );
    }

    #[test]
    fn test_non_retryable_kinds_stop_retries() {
        // Arrange
        let config = RetryConfig::new().with_non_retryable(ErrorKind::Auth);

        // Act & Assert
        assert!(!config.should_retry(&ResilienceError::operation_failed(
            ErrorKind::PermissionDenied,
            "denied"
        )));
        assert!(config.should_retry(&ResilienceError::operation_failed(
            ErrorKind::Timeout,
            "slow"
        )));
        assert!(
            !config.should_retry(&ResilienceError::circuit_open("op")),
            "Open circuit is never retried"
        );
    }
}
