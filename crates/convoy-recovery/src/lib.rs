// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State persistence and recovery for Convoy conversations.
//!
//! This crate keeps one user's conversation alive across reloads and crashes:
//!
//! - [`RecoveryManager`] — saves versioned, size-capped, optionally compressed
//!   snapshots and recovers the best available one through a cascade of
//!   storage tiers, never surfacing an error to the caller on recovery.
//! - [`store`] — the durable ([`FileStore`]) and volatile ([`MemoryStore`])
//!   tiers behind the [`convoy_core::StateStore`] seam.
//! - [`envelope`] — the versioned on-disk record format with ownership,
//!   version, and retention checks.
//! - [`validate`] — validation and best-effort sanitization of recovered
//!   state, so corrupted records degrade instead of poisoning the session.

pub mod envelope;
pub mod manager;
pub mod store;
pub mod validate;

pub use envelope::{VersionedState, COMPRESSED_PREFIX, STATE_VERSION};
pub use manager::RecoveryManager;
pub use store::{FileStore, MemoryStore};
pub use validate::{sanitize_state, validate_state};
