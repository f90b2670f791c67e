// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic testing.
//!
//! `MockTransport` implements [`Transport`] with injectable inbound frames,
//! captured outbound frames, and scriptable connect/send failures for
//! exercising the circuit breaker and retry paths.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use convoy_core::{ConvoyError, Transport};

/// A mock bidirectional channel for testing.
///
/// Provides:
/// - **inbound**: frames injected via `inject_frame()` are returned by `receive()`
/// - **sent**: frames passed to `send()` are captured and retrievable via `sent_frames()`
/// - **failure scripting**: `fail_next_connects(n)` / `fail_next_sends(n)` make
///   the next `n` operations fail with a transport error
pub struct MockTransport {
    inbound: Arc<Mutex<VecDeque<String>>>,
    sent: Arc<Mutex<Vec<String>>>,
    notify: Arc<Notify>,
    connected: AtomicBool,
    closed: AtomicBool,
    connect_calls: AtomicU32,
    connect_failures: AtomicU32,
    send_failures: AtomicU32,
    connect_delay_ms: AtomicU32,
    send_delay_ms: AtomicU32,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            connect_calls: AtomicU32::new(0),
            connect_failures: AtomicU32::new(0),
            send_failures: AtomicU32::new(0),
            connect_delay_ms: AtomicU32::new(0),
            send_delay_ms: AtomicU32::new(0),
        }
    }

    /// Inject a raw inbound frame. The next `receive()` returns it.
    pub async fn inject_frame(&self, frame: impl Into<String>) {
        self.inbound.lock().await.push_back(frame.into());
        self.notify.notify_one();
    }

    /// Inject an inbound event envelope built from a type and data payload.
    pub async fn inject_event(&self, event_type: &str, data: serde_json::Value) {
        let frame = serde_json::json!({"type": event_type, "data": data}).to_string();
        self.inject_frame(frame).await;
    }

    /// All frames captured by `send()`.
    pub async fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    /// Count of frames captured by `send()`.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Total calls made to `connect()`, successful or not.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Delay every connect call by `ms` milliseconds.
    ///
    /// Lets tests hold a connect attempt in flight while more callers join it.
    pub fn set_connect_delay_ms(&self, ms: u32) {
        self.connect_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Delay every send call by `ms` milliseconds.
    ///
    /// Lets tests hold a send in flight past the caller's timeout.
    pub fn set_send_delay_ms(&self, ms: u32) {
        self.send_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Make the next `n` connect calls fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` send calls fail.
    pub fn fail_next_sends(&self, n: u32) {
        self.send_failures.store(n, Ordering::SeqCst);
    }

    /// Close the inbound side: pending and future `receive()` calls fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Drop the connection without closing the inbound queue.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn take_scripted_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), ConvoyError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(u64::from(delay))).await;
        }
        if Self::take_scripted_failure(&self.connect_failures) {
            return Err(ConvoyError::transport("scripted connect failure"));
        }
        self.closed.store(false, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), ConvoyError> {
        let delay = self.send_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(u64::from(delay))).await;
        }
        if Self::take_scripted_failure(&self.send_failures) {
            return Err(ConvoyError::transport("scripted send failure"));
        }
        if !self.is_connected() {
            return Err(ConvoyError::transport("not connected"));
        }
        self.sent.lock().await.push(frame.to_string());
        Ok(())
    }

    async fn receive(&self) -> Result<String, ConvoyError> {
        loop {
            {
                let mut queue = self.inbound.lock().await;
                if let Some(frame) = queue.pop_front() {
                    return Ok(frame);
                }
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(ConvoyError::transport("transport closed"));
            }
            // Wait for a new injection or close.
            self.notify.notified().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
