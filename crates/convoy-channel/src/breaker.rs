// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breaker guarding connect and send operations.
//!
//! Modeled as an explicit state machine:
//! - **Closed**: operations pass through; consecutive failures are counted,
//!   and reaching the threshold opens the circuit.
//! - **Open**: operations are rejected immediately until the reset timeout
//!   elapses, then the breaker moves to half-open.
//! - **HalfOpen**: a bounded number of trial operations are admitted; that
//!   many consecutive successes close the circuit, any failure reopens it.

use std::time::Duration;

use convoy_core::ConvoyError;
use tokio::time::Instant;
use tracing::{debug, warn};

use convoy_config::model::ChannelConfig;

/// The three breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker for one channel client instance.
///
/// Not internally synchronized; the owning client wraps it in a mutex.
pub struct CircuitBreaker {
    state: BreakerState,
    /// Consecutive failures observed while closed.
    failures: u32,
    /// Consecutive successes observed while half-open.
    half_open_successes: u32,
    /// Trial operations admitted during the current half-open window.
    half_open_admitted: u32,
    last_failure: Option<Instant>,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_trials: u32,
}

impl CircuitBreaker {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            half_open_successes: 0,
            half_open_admitted: 0,
            last_failure: None,
            failure_threshold: config.failure_threshold,
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
            half_open_trials: config.half_open_trials,
        }
    }

    /// Current state, advancing Open -> HalfOpen if the reset timeout elapsed.
    pub fn state(&mut self) -> BreakerState {
        if self.state == BreakerState::Open
            && let Some(at) = self.last_failure
            && at.elapsed() >= self.reset_timeout
        {
            debug!("circuit reset timeout elapsed, entering half-open");
            self.state = BreakerState::HalfOpen;
            self.half_open_successes = 0;
            self.half_open_admitted = 0;
        }
        self.state
    }

    /// Admits or rejects one operation.
    ///
    /// Rejected operations fail with [`ConvoyError::CircuitOpen`] without ever
    /// reaching the transport. The caller must report the outcome of an
    /// admitted operation via [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn try_acquire(&mut self) -> Result<(), ConvoyError> {
        match self.state() {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => Err(ConvoyError::CircuitOpen {
                retry_after: self.retry_after(),
            }),
            BreakerState::HalfOpen => {
                if self.half_open_admitted < self.half_open_trials {
                    self.half_open_admitted += 1;
                    Ok(())
                } else {
                    // Trial window exhausted; wait for outcomes before
                    // admitting more traffic.
                    Err(ConvoyError::CircuitOpen {
                        retry_after: self.retry_after(),
                    })
                }
            }
        }
    }

    /// Records a successful operation.
    pub fn record_success(&mut self) {
        match self.state {
            BreakerState::Closed => {
                self.failures = 0;
            }
            BreakerState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.half_open_trials {
                    debug!(
                        trials = self.half_open_trials,
                        "half-open trials succeeded, closing circuit"
                    );
                    self.state = BreakerState::Closed;
                    self.failures = 0;
                    self.half_open_successes = 0;
                    self.half_open_admitted = 0;
                }
            }
            // Success reported for an operation admitted before the circuit
            // opened; the open state stands until the reset timeout.
            BreakerState::Open => {}
        }
    }

    /// Records a failed operation.
    pub fn record_failure(&mut self) {
        self.last_failure = Some(Instant::now());
        match self.state {
            BreakerState::Closed => {
                self.failures += 1;
                if self.failures >= self.failure_threshold {
                    warn!(
                        failures = self.failures,
                        "failure threshold reached, opening circuit"
                    );
                    self.state = BreakerState::Open;
                }
            }
            BreakerState::HalfOpen => {
                warn!("half-open trial failed, reopening circuit");
                self.state = BreakerState::Open;
                self.half_open_successes = 0;
                self.half_open_admitted = 0;
            }
            BreakerState::Open => {}
        }
    }

    /// Time remaining until the breaker next admits a trial operation.
    fn retry_after(&self) -> Duration {
        match self.last_failure {
            Some(at) => self.reset_timeout.saturating_sub(at.elapsed()),
            None => self.reset_timeout,
        }
    }
}
