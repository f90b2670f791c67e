// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle trait for per-user components managed by the factory.

use async_trait::async_trait;

/// A stateful component owned by exactly one user.
///
/// The component factory caches one instance per user per kind and calls
/// [`dispose`](UserComponent::dispose) before eviction so sockets and timers
/// are not leaked. Disposal must be idempotent.
#[async_trait]
pub trait UserComponent: Send + Sync + 'static {
    /// The user this instance belongs to.
    fn user_id(&self) -> &str;

    /// Releases held resources (background tasks, connections, snapshots).
    async fn dispose(&self);
}
