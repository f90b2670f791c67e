// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Convoy resilience layer.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Every tunable carries the default the rest of the
//! workspace is specified against.

use serde::{Deserialize, Serialize};

/// Top-level Convoy configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConvoyConfig {
    /// Channel client: circuit breaker and connect retry settings.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Conversation manager: send queue timing and retry settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// State recovery: persistence caps and retention settings.
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Component factory: lifecycle sweep and instance cap settings.
    #[serde(default)]
    pub factory: FactoryConfig,
}

/// Circuit breaker and connect retry configuration for the channel client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before allowing half-open trials.
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,

    /// Consecutive half-open successes required to close the breaker.
    #[serde(default = "default_half_open_trials")]
    pub half_open_trials: u32,

    /// Maximum connect attempts per integration.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Base backoff delay in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff growth factor per attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Backoff delay ceiling in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
            half_open_trials: default_half_open_trials(),
            connect_attempts: default_connect_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_secs() -> u64 {
    60
}

fn default_half_open_trials() -> u32 {
    3
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_backoff_cap_ms() -> u64 {
    10_000
}

/// Send queue configuration for the conversation manager.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Seconds a single channel send may take before it is treated as failed.
    #[serde(default = "default_message_timeout_secs")]
    pub message_timeout_secs: u64,

    /// Seconds to wait for the correlated agent completion before advancing.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// Send attempts per message before it is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds between retry passes, scaled by attempt count.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Interval in milliseconds for the idle-queue tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            message_timeout_secs: default_message_timeout_secs(),
            response_timeout_secs: default_response_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_message_timeout_secs() -> u64 {
    30
}

fn default_response_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_tick_interval_ms() -> u64 {
    100
}

/// Persistence configuration for the state recovery manager.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecoveryConfig {
    /// Directory for the durable file-backed tier. `None` uses the XDG data dir.
    #[serde(default)]
    pub storage_dir: Option<String>,

    /// Hard cap on serialized state size in bytes; larger saves are refused.
    #[serde(default = "default_max_state_bytes")]
    pub max_state_bytes: usize,

    /// Payloads above this size in bytes are compressed before persisting.
    #[serde(default = "default_compress_threshold_bytes")]
    pub compress_threshold_bytes: usize,

    /// Hours a persisted envelope stays acceptable; older records are discarded.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Sanity ceiling on message count; more is treated as corruption.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            max_state_bytes: default_max_state_bytes(),
            compress_threshold_bytes: default_compress_threshold_bytes(),
            retention_hours: default_retention_hours(),
            max_messages: default_max_messages(),
        }
    }
}

fn default_max_state_bytes() -> usize {
    1_048_576
}

fn default_compress_threshold_bytes() -> usize {
    10_240
}

fn default_retention_hours() -> u64 {
    24
}

fn default_max_messages() -> usize {
    10_000
}

/// Lifecycle configuration for the component factory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FactoryConfig {
    /// Seconds between eviction sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Seconds an instance may sit unaccessed before the sweep evicts it.
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,

    /// Maximum cached instances of one kind per user.
    #[serde(default = "default_per_user_cap")]
    pub per_user_cap: usize,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            max_idle_secs: default_max_idle_secs(),
            per_user_cap: default_per_user_cap(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_max_idle_secs() -> u64 {
    1_800
}

fn default_per_user_cap() -> usize {
    1
}
