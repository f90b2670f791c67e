// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage tiers implementing the [`convoy_core::StateStore`] seam.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;
