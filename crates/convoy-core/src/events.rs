// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent event vocabulary and the wire envelope shared with the remote agent.
//!
//! Everything crossing the channel is a `{ "type": ..., "data": ... }`
//! envelope. Inbound envelopes are normalized into [`AgentEvent`] with the
//! correlation ids lifted out of the data payload; outbound envelopes are
//! built from [`OutboundEnvelope`].

use serde::{Deserialize, Serialize};

use crate::error::ConvoyError;
use crate::types::now_millis;

/// Inbound event types emitted by the remote agent.
pub mod event_types {
    pub const AGENT_STARTED: &str = "agent_started";
    pub const AGENT_THINKING: &str = "agent_thinking";
    pub const TOOL_EXECUTING: &str = "tool_executing";
    pub const TOOL_COMPLETED: &str = "tool_completed";
    pub const AGENT_COMPLETED: &str = "agent_completed";
    pub const AGENT_ERROR: &str = "agent_error";
    pub const PROGRESS_UPDATE: &str = "progress_update";
    pub const STATUS_UPDATE: &str = "status_update";
}

/// Subscription key that receives every event regardless of type.
pub const WILDCARD_EVENT: &str = "*";

/// Event types the channel client must support for integration to succeed.
///
/// Absence of any of these from the supported vocabulary is a fatal
/// integration error at connect time.
pub const REQUIRED_EVENTS: [&str; 5] = [
    event_types::AGENT_STARTED,
    event_types::AGENT_THINKING,
    event_types::TOOL_EXECUTING,
    event_types::TOOL_COMPLETED,
    event_types::AGENT_COMPLETED,
];

/// Full inbound vocabulary recognized by the channel client.
pub const SUPPORTED_EVENTS: [&str; 8] = [
    event_types::AGENT_STARTED,
    event_types::AGENT_THINKING,
    event_types::TOOL_EXECUTING,
    event_types::TOOL_COMPLETED,
    event_types::AGENT_COMPLETED,
    event_types::AGENT_ERROR,
    event_types::PROGRESS_UPDATE,
    event_types::STATUS_UPDATE,
];

/// A normalized inbound agent event.
#[derive(Debug, Clone)]
pub struct AgentEvent {
    pub event_type: String,
    /// The agent run this event belongs to.
    pub run_id: Option<String>,
    pub thread_id: Option<String>,
    /// Message id this event correlates to (echoed by the agent on completion).
    pub reply_to: Option<String>,
    /// Full data payload, including the fields lifted above.
    pub data: serde_json::Value,
    /// Local receipt time, epoch milliseconds.
    pub received_at: i64,
}

/// Raw wire shape of an inbound envelope.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl AgentEvent {
    /// Parses a raw inbound frame into a normalized event.
    ///
    /// Correlation ids (`run_id`, `thread_id`, `reply_to`) are lifted out of
    /// the data payload when present; the payload itself is kept intact.
    pub fn parse(frame: &str) -> Result<Self, ConvoyError> {
        let raw: RawEnvelope = serde_json::from_str(frame).map_err(|e| {
            ConvoyError::transport(format!("malformed inbound envelope: {e}"))
        })?;

        let str_field = |key: &str| {
            raw.data
                .get(key)
                .and_then(|v| v.as_str())
                .map(String::from)
        };

        Ok(Self {
            run_id: str_field("run_id"),
            thread_id: str_field("thread_id"),
            reply_to: str_field("reply_to"),
            event_type: raw.event_type,
            data: raw.data,
            received_at: now_millis(),
        })
    }
}

/// Payload for a `user_message` outbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessagePayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Epoch milliseconds at send time.
    pub timestamp: i64,
    /// Message id the agent echoes back as `reply_to` on completion.
    pub message_id: String,
}

/// Payload for an `agent_update` outbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentUpdatePayload {
    pub run_id: String,
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub timestamp: i64,
}

/// Outbound message kinds sent to the remote agent.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    UserMessage(UserMessagePayload),
    AgentUpdate(AgentUpdatePayload),
}

impl OutboundEnvelope {
    /// Serializes the envelope to its wire frame.
    pub fn to_frame(&self) -> Result<String, ConvoyError> {
        serde_json::to_string(self)
            .map_err(|e| ConvoyError::Internal(format!("failed to encode envelope: {e}")))
    }
}
