// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./convoy.toml` > `~/.config/convoy/convoy.toml` >
//! `/etc/convoy/convoy.toml` with environment variable overrides via the
//! `CONVOY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ConvoyConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/convoy/convoy.toml` (system-wide)
/// 3. `~/.config/convoy/convoy.toml` (user XDG config)
/// 4. `./convoy.toml` (local directory)
/// 5. `CONVOY_*` environment variables
pub fn load_config() -> Result<ConvoyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConvoyConfig::default()))
        .merge(Toml::file("/etc/convoy/convoy.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("convoy/convoy.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("convoy.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and embedded configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ConvoyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConvoyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ConvoyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConvoyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `CONVOY_QUEUE_MESSAGE_TIMEOUT_SECS`
/// must map to `queue.message_timeout_secs`, not `queue.message.timeout.secs`.
fn env_provider() -> Env {
    Env::prefixed("CONVOY_").map(|key| {
        // `key` is the env var name with prefix stripped, still in its
        // original (uppercase) form: figment lowercases only after mapping.
        // Example: CONVOY_CHANNEL_FAILURE_THRESHOLD -> "CHANNEL_FAILURE_THRESHOLD"
        let key_str = key.as_str().to_ascii_lowercase();
        let mapped = key_str
            .replacen("channel_", "channel.", 1)
            .replacen("queue_", "queue.", 1)
            .replacen("recovery_", "recovery.", 1)
            .replacen("factory_", "factory.", 1);
        mapped.into()
    })
}
