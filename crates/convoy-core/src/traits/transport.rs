// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter trait for the underlying bidirectional channel.

use async_trait::async_trait;

use crate::error::ConvoyError;

/// Adapter for the raw bidirectional event channel.
///
/// Convoy assumes open/send/receive/close semantics that are reliable enough
/// to retry; everything above this seam (circuit breaking, backoff, event
/// normalization) lives in the channel client.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establishes the underlying connection.
    async fn connect(&self) -> Result<(), ConvoyError>;

    /// Sends one serialized envelope frame.
    async fn send(&self, frame: &str) -> Result<(), ConvoyError>;

    /// Receives the next raw inbound frame, waiting until one arrives.
    ///
    /// Returns an error when the connection is closed.
    async fn receive(&self) -> Result<String, ConvoyError>;

    /// Whether the transport currently holds an open connection.
    fn is_connected(&self) -> bool;

    /// Closes the connection, releasing any held resources.
    async fn disconnect(&self);
}
