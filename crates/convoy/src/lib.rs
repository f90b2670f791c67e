// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Convoy: a client-side resilience layer for real-time agent conversations.
//!
//! Everything a user-facing chat surface needs to talk to a remote agent
//! without falling over: a circuit-breaking channel client, a serialized
//! per-user send queue with bounded retries and completion correlation,
//! layered state persistence and recovery, and a per-user component factory
//! that keeps the whole thing isolated and bounded.
//!
//! The typical entry point is [`ComponentFactory`]:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use convoy::{ComponentFactory, ConvoyConfig, MemoryStore};
//! # use convoy::{ConvoyError, Transport, TransportFactory};
//! # struct MyTransports;
//! # impl TransportFactory for MyTransports {
//! #     fn transport_for(&self, _: &str) -> Result<Arc<dyn Transport>, ConvoyError> {
//! #         unimplemented!()
//! #     }
//! # }
//!
//! # async fn run() -> Result<(), ConvoyError> {
//! let factory = ComponentFactory::new(
//!     ConvoyConfig::default(),
//!     Arc::new(MyTransports),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! let conversation = factory.conversation_manager("alice").await?;
//! conversation.send_message("hello").await;
//! # Ok(())
//! # }
//! ```

pub use convoy_channel::{BackoffPolicy, BreakerState, ChannelClient, CircuitBreaker, Subscription};
pub use convoy_config::loader::load_config;
pub use convoy_config::model::{
    ChannelConfig, ConvoyConfig, FactoryConfig, QueueConfig, RecoveryConfig,
};
pub use convoy_conversation::ConversationManager;
pub use convoy_core::{
    AgentEvent, ConversationState, ConvoyError, Message, MessageRole, MessageStatus, StateStore,
    Transport, UserComponent, UvsContext, REQUIRED_EVENTS, SUPPORTED_EVENTS, WILDCARD_EVENT,
};
pub use convoy_factory::{ComponentFactory, TransportFactory};
pub use convoy_recovery::{FileStore, MemoryStore, RecoveryManager};

/// The crates behind the facade, for callers that need the full module paths.
pub mod crates {
    pub use convoy_channel as channel;
    pub use convoy_config as config;
    pub use convoy_conversation as conversation;
    pub use convoy_core as core;
    pub use convoy_factory as factory;
    pub use convoy_recovery as recovery;
}
