// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user conversation management for Convoy.
//!
//! [`ConversationManager`] owns one user's message history, serializes
//! outbound sends through a FIFO queue with bounded retries, and correlates
//! inbound agent completions back to the message that triggered them. State
//! mutations are persisted through the recovery manager and fanned out to
//! registered observers.

pub mod manager;
pub mod queue;

pub use manager::ConversationManager;
pub use queue::QueueItem;
