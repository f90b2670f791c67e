// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Convoy integration tests.
//!
//! Provides mock adapters for fast, deterministic, CI-runnable tests without
//! a real channel or storage backend.
//!
//! # Components
//!
//! - [`MockTransport`] - Mock bidirectional channel with frame injection,
//!   capture, and scriptable connect/send failures
//! - [`FlakyStore`] - In-memory state store with scriptable read/write
//!   failures
//! - [`init_test_logging`] - opt-in tracing output for debugging test runs

pub mod flaky_store;
pub mod logging;
pub mod mock_transport;

pub use flaky_store::FlakyStore;
pub use logging::init_test_logging;
pub use mock_transport::MockTransport;
