// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory state store with scriptable failures.
//!
//! `FlakyStore` implements [`StateStore`] over a plain map, with counters
//! that make the next reads or writes fail. Used to exercise the recovery
//! manager's fallback cascade without a real storage tier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use convoy_core::{ConvoyError, StateStore};

/// A map-backed store whose next `n` reads or writes can be made to fail.
pub struct FlakyStore {
    entries: Mutex<HashMap<String, String>>,
    get_failures: AtomicU32,
    put_failures: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            get_failures: AtomicU32::new(0),
            put_failures: AtomicU32::new(0),
        }
    }

    /// Make the next `n` `get()` calls fail.
    pub fn fail_next_gets(&self, n: u32) {
        self.get_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `put()` calls fail.
    pub fn fail_next_puts(&self, n: u32) {
        self.put_failures.store(n, Ordering::SeqCst);
    }

    /// Write a raw value directly, bypassing failure scripting.
    ///
    /// Lets tests seed corrupted or foreign payloads a tier might contain.
    pub async fn seed(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    fn take_scripted_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ConvoyError> {
        if Self::take_scripted_failure(&self.get_failures) {
            return Err(ConvoyError::Storage {
                source: Box::new(std::io::Error::other("scripted get failure")),
            });
        }
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), ConvoyError> {
        if Self::take_scripted_failure(&self.put_failures) {
            return Err(ConvoyError::Storage {
                source: Box::new(std::io::Error::other("scripted put failure")),
            });
        }
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ConvoyError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove_round_trip() {
        let store = FlakyStore::new();
        store.put("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn scripted_failures_apply_then_clear() {
        let store = FlakyStore::new();
        store.seed("k", "v").await;

        store.fail_next_gets(1);
        assert!(store.get("k").await.is_err());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.fail_next_puts(1);
        assert!(store.put("k2", "v2").await.is_err());
        assert!(store.put("k2", "v2").await.is_ok());
    }
}
