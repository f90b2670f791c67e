// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user component lifecycle for Convoy.
//!
//! [`ComponentFactory`] hands out cached singletons of the channel client,
//! conversation manager, and recovery manager, one of each per user, and
//! disposes them on idle timeout, per-user cap pressure, explicit cleanup,
//! or shutdown. User isolation is the factory's core guarantee: no instance
//! is ever shared across users.

mod cache;
pub mod factory;

pub use factory::{ComponentFactory, TransportFactory};
