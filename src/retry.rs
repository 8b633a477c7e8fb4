//! Retry Policy (C6): exponential backoff with jitter, per spec.md §4.6.
//!
//! `nth retry waits min(maxDelay, base · exponentialBase^n) · (1 ± jitter)`;
//! rate-limited failures use the longer rate-limit base delay.  `maxRetries`
//! caps attempts per feature; categories that only ever retry once (tooling,
//! unknown) are capped at one regardless of the configured `maxRetries`.

use std::time::Duration;

use rand::Rng;

use crate::classify::Category;
use crate::config::RetryConfig;

/// Outcome of asking the retry policy whether a feature should be retried.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RetryDecision {
    /// Retry after waiting this long.
    Retry { delay: Duration },
    /// Stop retrying; the feature should be marked `blocked`.
    GiveUp,
}

/// Pure decision function. `attempts_so_far` counts attempts already made
/// for this feature (the session that just failed), i.e. it is 1 after the
/// first failure.
pub fn decide(category: Category, attempts_so_far: u32, config: &RetryConfig) -> RetryDecision {
    if !category.is_retryable() {
        return RetryDecision::GiveUp;
    }
    let cap = if category.retry_once_only() {
        1
    } else {
        config.max_retries
    };
    if attempts_so_far > cap {
        return RetryDecision::GiveUp;
    }
    RetryDecision::Retry {
        delay: compute_delay(category, attempts_so_far, config),
    }
}

/// Compute the backoff delay for the nth retry (n = `attempts_so_far`),
/// jittered by ±`config.jitter`.
pub fn compute_delay(category: Category, n: u32, config: &RetryConfig) -> Duration {
    let base = if category.uses_rate_limit_backoff() {
        config.rate_limit_base_delay
    } else {
        config.base_delay
    };
    let unjittered = (base.as_secs_f64() * config.exponential_base.powi(n as i32))
        .min(config.max_delay.as_secs_f64());
    let jittered = apply_jitter(unjittered, config.jitter);
    Duration::from_secs_f64(jittered.max(0.0))
}

fn apply_jitter(value: f64, jitter: f64) -> f64 {
    let mut rng = rand::rng();
    let factor = 1.0 + rng.random_range(-jitter..=jitter);
    value * factor
}

/// Bounds (without randomness) that an observed jittered delay must fall
/// within, used by tests that can't control the RNG directly.
pub fn delay_bounds(category: Category, n: u32, config: &RetryConfig) -> (Duration, Duration) {
    let base = if category.uses_rate_limit_backoff() {
        config.rate_limit_base_delay
    } else {
        config.base_delay
    };
    let unjittered =
        (base.as_secs_f64() * config.exponential_base.powi(n as i32)).min(config.max_delay.as_secs_f64());
    let lo = unjittered * (1.0 - config.jitter);
    let hi = unjittered * (1.0 + config.jitter);
    (Duration::from_secs_f64(lo.max(0.0)), Duration::from_secs_f64(hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_retries_up_to_max_retries() {
        let cfg = RetryConfig::default();
        for n in 1..=cfg.max_retries {
            assert!(matches!(
                decide(Category::Transient, n, &cfg),
                RetryDecision::Retry { .. }
            ));
        }
        assert_eq!(
            decide(Category::Transient, cfg.max_retries + 1, &cfg),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn billing_and_auth_never_retry() {
        let cfg = RetryConfig::default();
        assert_eq!(decide(Category::Billing, 1, &cfg), RetryDecision::GiveUp);
        assert_eq!(decide(Category::Auth, 1, &cfg), RetryDecision::GiveUp);
    }

    #[test]
    fn tooling_and_unknown_retry_once_only() {
        let cfg = RetryConfig::default();
        assert!(matches!(
            decide(Category::Tooling, 1, &cfg),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(decide(Category::Tooling, 2, &cfg), RetryDecision::GiveUp);
        assert!(matches!(
            decide(Category::Unknown, 1, &cfg),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(decide(Category::Unknown, 2, &cfg), RetryDecision::GiveUp);
    }

    #[test]
    fn rate_limit_uses_longer_base_delay() {
        let cfg = RetryConfig::default();
        let (lo, hi) = delay_bounds(Category::RateLimit, 1, &cfg);
        // base=30s, exponentialBase=2, n=1 -> 60s unjittered, ±10%
        assert!(lo.as_secs_f64() >= 54.0);
        assert!(hi.as_secs_f64() <= 66.0);
    }

    #[test]
    fn delay_caps_at_max_delay() {
        let cfg = RetryConfig::default();
        let (_, hi) = delay_bounds(Category::Transient, 20, &cfg);
        assert!(hi.as_secs_f64() <= cfg.max_delay.as_secs_f64() * (1.0 + cfg.jitter));
    }

    #[test]
    fn observed_delay_falls_within_bounds() {
        let cfg = RetryConfig::default();
        let decision = decide(Category::Transient, 1, &cfg);
        let (lo, hi) = delay_bounds(Category::Transient, 1, &cfg);
        match decision {
            RetryDecision::Retry { delay } => {
                assert!(delay >= lo && delay <= hi);
            }
            RetryDecision::GiveUp => panic!("expected retry"),
        }
    }
}
