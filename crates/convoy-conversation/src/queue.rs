// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send queue items.
//!
//! An item lives only inside the in-memory queue: it is removed on successful
//! delivery or once its attempts are exhausted. Message content and status
//! stay in the conversation state; the item carries just what the send path
//! needs.

use tokio::time::Instant;

use convoy_core::types::now_millis;

/// One queued outbound message.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Id of the message in the conversation state.
    pub message_id: String,
    /// Text snapshot taken at enqueue time.
    pub text: String,
    /// Enqueue time, epoch milliseconds.
    pub enqueued_at: i64,
    /// Completed send attempts.
    pub attempts: u32,
    /// Earliest instant the next attempt may start; `None` means immediately.
    pub not_before: Option<Instant>,
}

impl QueueItem {
    pub fn new(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            text: text.into(),
            enqueued_at: now_millis(),
            attempts: 0,
            not_before: None,
        }
    }

    /// Whether the item may be attempted at `now`.
    pub fn ready(&self, now: Instant) -> bool {
        self.not_before.is_none_or(|t| t <= now)
    }

    /// The item as it should be requeued after a failed attempt.
    pub fn retried(&self, attempts: u32, not_before: Instant) -> Self {
        Self {
            attempts,
            not_before: Some(not_before),
            ..self.clone()
        }
    }
}
