// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage tier trait for persisted conversation state.

use async_trait::async_trait;

use crate::error::ConvoyError;

/// A key/value tier in the recovery storage hierarchy.
///
/// Tiers differ only in durability: the file-backed store survives process
/// restarts, the in-memory store does not. The recovery manager layers them
/// by priority and treats every tier read as untrusted input.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Reads the value for `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>, ConvoyError>;

    /// Writes `value` under `key`, replacing any existing value.
    async fn put(&self, key: &str, value: &str) -> Result<(), ConvoyError>;

    /// Removes `key` if present. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), ConvoyError>;
}
