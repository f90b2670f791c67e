// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits implemented by external collaborators and Convoy components.

pub mod component;
pub mod store;
pub mod transport;

pub use component::UserComponent;
pub use store::StateStore;
pub use transport::Transport;
