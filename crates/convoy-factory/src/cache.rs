// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user instance cache shared by the factory's component kinds.
//!
//! Eviction is decided here but executed by the caller: every method that
//! removes entries hands the instances back so the factory can run their
//! async `dispose()` outside the map locks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use convoy_core::UserComponent;

struct CacheEntry<T> {
    instance: Arc<T>,
    created_at: Instant,
    last_access: Instant,
}

/// Caches instances of one component kind, keyed by user.
pub(crate) struct ComponentCache<T: UserComponent> {
    kind: &'static str,
    entries: DashMap<String, Vec<CacheEntry<T>>>,
    gates: DashMap<String, Arc<Mutex<()>>>,
}

impl<T: UserComponent> ComponentCache<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    /// The user's construction gate.
    ///
    /// Concurrent first requests for one user must not race independent
    /// constructions (the cap eviction would dispose the loser while its
    /// caller still holds it). The factory holds this lock across its
    /// miss-construct-insert sequence; late joiners re-check the cache under
    /// the gate and receive the winner's instance.
    pub fn construction_gate(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.gates.entry(user_id.to_string()).or_default().clone()
    }

    /// Returns the newest cached instance for `user_id`, refreshing its
    /// last-access time.
    pub fn get(&self, user_id: &str) -> Option<Arc<T>> {
        let mut list = self.entries.get_mut(user_id)?;
        let now = Instant::now();
        let entry = list.iter_mut().max_by_key(|e| e.created_at)?;
        entry.last_access = now;
        Some(Arc::clone(&entry.instance))
    }

    /// Caches `instance`, returning any instances evicted to honor the
    /// per-user cap (oldest by creation time first).
    pub fn insert(&self, user_id: &str, instance: Arc<T>, cap: usize) -> Vec<Arc<T>> {
        let now = Instant::now();
        let mut list = self.entries.entry(user_id.to_string()).or_default();
        list.push(CacheEntry {
            instance,
            created_at: now,
            last_access: now,
        });

        let mut evicted = Vec::new();
        while list.len() > cap.max(1) {
            let oldest = list
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(i, _)| i);
            if let Some(i) = oldest {
                evicted.push(list.remove(i).instance);
            }
        }

        if !evicted.is_empty() {
            debug!(
                kind = self.kind,
                user_id,
                evicted = evicted.len(),
                "per-user cap exceeded, evicting oldest"
            );
        }
        evicted
    }

    /// Removes entries whose last access is older than `max_idle`.
    pub fn sweep(&self, max_idle: std::time::Duration) -> Vec<Arc<T>> {
        let now = Instant::now();
        let mut evicted = Vec::new();

        self.entries.retain(|_, list| {
            list.retain(|entry| {
                let idle = now.duration_since(entry.last_access);
                if idle > max_idle {
                    evicted.push(Arc::clone(&entry.instance));
                    false
                } else {
                    true
                }
            });
            !list.is_empty()
        });

        if !evicted.is_empty() {
            debug!(kind = self.kind, evicted = evicted.len(), "idle instances swept");
        }
        evicted
    }

    /// Removes and returns all of one user's instances.
    pub fn remove_user(&self, user_id: &str) -> Vec<Arc<T>> {
        self.gates.remove(user_id);
        self.entries
            .remove(user_id)
            .map(|(_, list)| list.into_iter().map(|e| e.instance).collect())
            .unwrap_or_default()
    }

    /// Removes and returns every cached instance.
    pub fn drain_all(&self) -> Vec<Arc<T>> {
        let users: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        users
            .into_iter()
            .flat_map(|user| self.remove_user(&user))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Dummy {
        user_id: String,
    }

    #[async_trait]
    impl UserComponent for Dummy {
        fn user_id(&self) -> &str {
            &self.user_id
        }

        async fn dispose(&self) {}
    }

    fn dummy(user: &str) -> Arc<Dummy> {
        Arc::new(Dummy {
            user_id: user.to_string(),
        })
    }

    #[tokio::test]
    async fn insert_then_get_returns_the_same_instance() {
        let cache = ComponentCache::new("dummy");
        let instance = dummy("u1");
        assert!(cache.insert("u1", instance.clone(), 1).is_empty());

        let cached = cache.get("u1").unwrap();
        assert!(Arc::ptr_eq(&cached, &instance));
        assert!(cache.get("u2").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cap_evicts_the_oldest_instance() {
        let cache = ComponentCache::new("dummy");
        let first = dummy("u1");
        let second = dummy("u1");

        cache.insert("u1", first.clone(), 1);
        tokio::time::advance(Duration::from_secs(1)).await;
        let evicted = cache.insert("u1", second.clone(), 1);

        assert_eq!(evicted.len(), 1);
        assert!(Arc::ptr_eq(&evicted[0], &first));
        assert!(Arc::ptr_eq(&cache.get("u1").unwrap(), &second));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_idle_instances() {
        let cache = ComponentCache::new("dummy");
        cache.insert("idle", dummy("idle"), 1);
        cache.insert("busy", dummy("busy"), 1);

        tokio::time::advance(Duration::from_secs(100)).await;
        cache.get("busy");
        tokio::time::advance(Duration::from_secs(31)).await;

        let evicted = cache.sweep(Duration::from_secs(120));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].user_id(), "idle");
        assert!(cache.get("idle").is_none());
        assert!(cache.get("busy").is_some());
    }

    #[tokio::test]
    async fn remove_user_and_drain_all_empty_the_cache() {
        let cache = ComponentCache::new("dummy");
        cache.insert("u1", dummy("u1"), 1);
        cache.insert("u2", dummy("u2"), 1);

        assert_eq!(cache.remove_user("u1").len(), 1);
        assert!(cache.remove_user("u1").is_empty());
        assert_eq!(cache.drain_all().len(), 1);
        assert_eq!(cache.count(), 0);
    }
}
