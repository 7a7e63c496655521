use crate::config::{RetryConfig, RetryStrategy};
use crate::internals::retry::delay;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(d: Duration) -> f64 {
        d.as_secs_f64()
    }

    fn millis(d: Duration) -> f64 {
        (d.as_secs_f64() * 1000.0 * 1000.0).round() / 1000.0
    }

    // Unit Tests for Backoff Delay Calculation
    //
    // UNIT UNDER TEST: retry::delay (pure function)
    //
    // BUSINESS RESPONSIBILITY:
    //   - Spaces retries so a struggling dependency is not hammered
    //   - Caps every wait at the configured maximum
    //   - Spreads concurrent retries apart with bounded jitter
    //
    // TEST COVERAGE:
    //   - Zero delay for attempt 0
    //   - Exponential, Fibonacci, fixed and random progressions
    //   - Cap and monotonicity without jitter
    //   - Jitter bounds

    #[test]
    fn test_attempt_zero_has_no_delay() {
        // Arrange & Act & Assert
        for strategy in [
            RetryStrategy::Fixed,
            RetryStrategy::Exponential,
            RetryStrategy::Fibonacci,
            RetryStrategy::Random,
        ] {
            assert_eq!(
                delay(strategy, 0, Duration::from_secs(1), Duration::from_secs(10), true),
                Duration::ZERO,
                "{strategy:?} must not wait before the first attempt"
            );
        }
    }

    #[test]
    fn test_exponential_sequence_is_capped() {
        // Test verifies base 1s, cap 10s gives 1, 2, 4, 8, 10, 10, 10

        // Arrange
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(10);

        // Act
        let delays: Vec<f64> = (1..=7)
            .map(|attempt| secs(delay(RetryStrategy::Exponential, attempt, base, max, false)))
            .collect();

        // Assert
        assert_eq!(delays, vec![1.0, 2.0, 4.0, 8.0, 10.0, 10.0, 10.0]);
    }

    #[test]
    fn test_fibonacci_sequence() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(60);

        let delays: Vec<f64> = (1..=6)
            .map(|attempt| millis(delay(RetryStrategy::Fibonacci, attempt, base, max, false)))
            .collect();

        assert_eq!(delays, vec![100.0, 100.0, 200.0, 300.0, 500.0, 800.0]);
    }

    #[test]
    fn test_fixed_strategy_is_constant() {
        let base = Duration::from_millis(250);

        for attempt in 1..5 {
            assert_eq!(
                delay(RetryStrategy::Fixed, attempt, base, Duration::from_secs(1), false),
                base
            );
        }
    }

    #[test]
    fn test_random_strategy_stays_within_bounds() {
        // Arrange
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);

        for attempt in 1..=5 {
            // Act
            let d = secs(delay(RetryStrategy::Random, attempt, base, max, false));

            // Assert
            assert!(
                (1.0..=f64::from(attempt)).contains(&d),
                "attempt {attempt} produced {d}s"
            );
        }
    }

    #[test]
    fn test_delays_are_monotone_and_bounded_without_jitter() {
        // Arrange
        let base = Duration::from_millis(300);
        let max = Duration::from_secs(5);

        for strategy in [
            RetryStrategy::Fixed,
            RetryStrategy::Exponential,
            RetryStrategy::Fibonacci,
        ] {
            // Act
            let delays: Vec<Duration> = (1..=40)
                .map(|attempt| delay(strategy, attempt, base, max, false))
                .collect();

            // Assert
            assert!(
                delays.windows(2).all(|w| w[0] <= w[1]),
                "{strategy:?} delays must not decrease"
            );
            assert!(delays.iter().all(|d| *d <= max), "{strategy:?} exceeds cap");
        }
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        // Arrange
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(60);

        for _ in 0..200 {
            // Act
            let d = secs(delay(RetryStrategy::Fixed, 1, base, max, true));

            // Assert
            assert!((1.8..=2.2).contains(&d), "jittered delay {d}s out of range");
        }
    }

    #[test]
    fn test_huge_attempt_numbers_saturate_at_cap() {
        let max = Duration::from_secs(30);

        assert_eq!(
            delay(RetryStrategy::Exponential, u32::MAX, Duration::from_secs(1), max, false),
            max
        );
        assert_eq!(
            delay(RetryStrategy::Fibonacci, 5000, Duration::from_secs(1), max, false),
            max
        );
        assert_eq!(
            delay(RetryStrategy::Exponential, u32::MAX, Duration::ZERO, max, false),
            Duration::ZERO,
            "Zero base never waits"
        );
    }

    // Unit Tests for RetryConfig delay wiring
    //
    // UNIT UNDER TEST: RetryConfig::delay_for
    //
    // BUSINESS RESPONSIBILITY:
    //   - Applies the operation's own strategy and limits to the delay function
    //
    // TEST COVERAGE:
    //   - Config fields reach the calculation

    #[test]
    fn test_config_delay_uses_its_own_settings() {
        // Arrange
        let config = RetryConfig::new()
            .with_strategy(RetryStrategy::Exponential)
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(30))
            .with_jitter(false);

        // Act & Assert
        assert_eq!(millis(config.delay_for(1)), 10.0);
        assert_eq!(millis(config.delay_for(2)), 20.0);
        assert_eq!(millis(config.delay_for(3)), 30.0, "Capped at max_delay");
    }
}
