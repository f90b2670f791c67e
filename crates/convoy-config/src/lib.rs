// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Convoy resilience layer.
//!
//! Layered TOML configuration with environment variable overrides, following
//! the XDG hierarchy. All tunables carry compiled defaults so an empty config
//! is always valid.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::ConvoyConfig;
