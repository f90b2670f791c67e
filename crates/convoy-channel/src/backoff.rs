// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with jitter for connect retries.

use std::time::Duration;

use rand::Rng;

use convoy_config::model::ChannelConfig;

/// Backoff schedule: `min(base * factor^(attempt-1), cap)` with ±20% jitter.
///
/// Jitter spreads reconnects from many clients that failed at the same
/// moment, so they do not hammer the channel in lockstep.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    factor: f64,
    cap: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            base: Duration::from_millis(config.backoff_base_ms),
            factor: config.backoff_factor,
            cap: Duration::from_millis(config.backoff_cap_ms),
            max_attempts: config.connect_attempts,
        }
    }

    /// Maximum attempts the retry loop may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Jittered delay before the next attempt. `attempt` is 1-based.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1).min(32) as i32);
        let raw = self.base.as_secs_f64() * exp;
        let capped = raw.min(self.cap.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        Duration::from_secs_f64(capped * jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(&ChannelConfig::default())
    }

    #[test]
    fn delay_grows_exponentially_within_jitter_bounds() {
        let policy = policy();
        for attempt in 1..=5u32 {
            let expected = 100.0 * 2.0_f64.powi(attempt as i32 - 1);
            let delay = policy.delay_for(attempt).as_secs_f64() * 1000.0;
            assert!(
                delay >= expected * 0.8 - 1.0 && delay <= expected * 1.2 + 1.0,
                "attempt {attempt}: delay {delay}ms outside jitter bounds of {expected}ms"
            );
        }
    }

    #[test]
    fn delay_is_capped() {
        let policy = policy();
        // Attempt 10 would be 51.2s uncapped; cap is 10s (+20% jitter).
        let delay = policy.delay_for(10);
        assert!(delay <= Duration::from_secs_f64(12.1));
        assert!(delay >= Duration::from_secs_f64(7.9));
    }

    #[test]
    fn jitter_varies_between_samples() {
        let policy = policy();
        let samples: Vec<Duration> = (0..32).map(|_| policy.delay_for(3)).collect();
        let first = samples[0];
        assert!(
            samples.iter().any(|d| *d != first),
            "expected jitter to produce varying delays"
        );
    }

    #[test]
    fn max_attempts_comes_from_config() {
        assert_eq!(policy().max_attempts(), 5);
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = policy();
        let delay = policy.delay_for(u32::MAX);
        assert!(delay <= Duration::from_secs_f64(12.1));
    }

    proptest::proptest! {
        /// Any attempt number under any sane config stays within
        /// [0.8 * base, 1.2 * cap].
        #[test]
        fn delay_always_within_configured_bounds(
            attempt in 1u32..10_000,
            base_ms in 1u64..5_000,
            factor in 1.0f64..4.0,
            cap_ms in 5_000u64..60_000,
        ) {
            let config = ChannelConfig {
                backoff_base_ms: base_ms,
                backoff_factor: factor,
                backoff_cap_ms: cap_ms,
                ..Default::default()
            };
            let policy = BackoffPolicy::new(&config);
            let delay = policy.delay_for(attempt).as_secs_f64() * 1000.0;

            proptest::prop_assert!(delay >= base_ms as f64 * 0.8 - 1.0);
            proptest::prop_assert!(delay <= cap_ms as f64 * 1.2 + 1.0);
        }
    }
}
