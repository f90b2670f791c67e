// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation data model shared across the Convoy workspace.
//!
//! [`ConversationState`] is owned exclusively by one conversation manager
//! instance per user. Messages are append-only: they are created on send or
//! on inbound completion and mutated only by the owning manager, never deleted.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Who produced a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Delivery status of a message, as tracked by the conversation manager.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Created locally, not yet handed to the channel.
    Pending,
    /// Currently in flight on the channel.
    Sending,
    /// Accepted by the channel.
    Sent,
    /// Retries exhausted; permanently failed.
    Failed,
    /// Inbound message received from the agent.
    Received,
}

/// A single conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Globally unique per user + time + random suffix.
    pub id: String,
    pub text: String,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    pub role: MessageRole,
    pub status: MessageStatus,
    /// Number of send retries consumed so far.
    #[serde(default)]
    pub retries: u32,
    /// Free-form metadata attached by the caller or the agent.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    /// Creates a new message owned by `user_id` with a collision-resistant id.
    pub fn new(user_id: &str, text: impl Into<String>, role: MessageRole) -> Self {
        let now = now_millis();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{user_id}-{now}-{}", &suffix[..8]),
            text: text.into(),
            created_at: now,
            role,
            status: MessageStatus::Pending,
            retries: 0,
            metadata: serde_json::Map::new(),
        }
    }
}

/// Structured side-channel data attached to a completed agent run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UvsContext {
    #[serde(default)]
    pub report_type: Option<String>,
    #[serde(default)]
    pub has_data: bool,
    #[serde(default)]
    pub has_optimization: bool,
    /// Nested result payloads from the agent, passed through opaquely.
    #[serde(default)]
    pub results: Option<serde_json::Value>,
    #[serde(default)]
    pub suggested_next_steps: Vec<String>,
}

/// The full conversation state for one user.
///
/// The recovery manager serializes and deserializes this; it never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Insertion order is significant; append-only.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// The in-flight agent run, if any.
    #[serde(default)]
    pub active_run_id: Option<String>,
    #[serde(default)]
    pub is_processing: bool,
    /// Epoch milliseconds of the last state mutation.
    #[serde(default)]
    pub last_activity: i64,
    #[serde(default)]
    pub uvs_context: Option<UvsContext>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            thread_id: None,
            messages: Vec::new(),
            active_run_id: None,
            is_processing: false,
            last_activity: now_millis(),
            uvs_context: None,
        }
    }
}

impl ConversationState {
    /// Marks activity now and returns the timestamp used.
    pub fn touch(&mut self) -> i64 {
        self.last_activity = now_millis();
        self.last_activity
    }

    /// Finds a message by id.
    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
