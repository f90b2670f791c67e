// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fault-tolerant channel client for the Convoy resilience layer.
//!
//! Presents a reliable-looking send/subscribe surface over an unreliable
//! bidirectional channel:
//! - **Circuit breaker** around every connect and send operation
//! - **Exponential backoff** retry (with jitter) around connect attempts
//! - **Idempotent integration** via a shared in-flight connect future
//! - **Typed event subscriptions** over normalized agent events

pub mod backoff;
pub mod breaker;
pub mod client;

pub use backoff::BackoffPolicy;
pub use breaker::{BreakerState, CircuitBreaker};
pub use client::{ChannelClient, Subscription};
