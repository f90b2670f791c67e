// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Convoy client-side resilience layer.
//!
//! This crate provides the foundational trait definitions, error types, the
//! conversation data model, and the agent event vocabulary used throughout
//! the Convoy workspace.

pub mod error;
pub mod events;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ConvoyError;
pub use events::{AgentEvent, OutboundEnvelope, REQUIRED_EVENTS, SUPPORTED_EVENTS, WILDCARD_EVENT};
pub use types::{ConversationState, Message, MessageRole, MessageStatus, UvsContext};

// Re-export adapter traits at crate root.
pub use traits::{StateStore, Transport, UserComponent};
