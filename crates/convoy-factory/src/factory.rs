// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-user component factory.
//!
//! Single entry point for obtaining a user's channel client, conversation
//! manager, and recovery manager. Each kind is a cached singleton per user;
//! nothing is ever shared across users. A background sweep disposes and
//! evicts instances that sit idle past the configured ceiling, and a per-user
//! cap bounds how many instances of one kind a user can hold.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use convoy_channel::ChannelClient;
use convoy_config::model::ConvoyConfig;
use convoy_conversation::ConversationManager;
use convoy_core::{ConvoyError, StateStore, Transport, UserComponent};
use convoy_recovery::RecoveryManager;

use crate::cache::ComponentCache;

/// Produces the transport for one user's channel client.
///
/// The factory owns component lifecycles but not the wire; callers plug in
/// whatever transport the deployment uses.
pub trait TransportFactory: Send + Sync + 'static {
    fn transport_for(&self, user_id: &str) -> Result<Arc<dyn Transport>, ConvoyError>;
}

/// Caches and disposes per-user component instances.
pub struct ComponentFactory {
    config: ConvoyConfig,
    transports: Arc<dyn TransportFactory>,
    durable: Arc<dyn StateStore>,
    volatile: Arc<dyn StateStore>,
    channels: ComponentCache<ChannelClient>,
    conversations: ComponentCache<ConversationManager>,
    recoveries: ComponentCache<RecoveryManager>,
    sweep_cancel: CancellationToken,
}

impl ComponentFactory {
    /// Creates the factory and starts its eviction sweep task.
    pub fn new(
        config: ConvoyConfig,
        transports: Arc<dyn TransportFactory>,
        durable: Arc<dyn StateStore>,
        volatile: Arc<dyn StateStore>,
    ) -> Arc<Self> {
        let factory = Arc::new(Self {
            config,
            transports,
            durable,
            volatile,
            channels: ComponentCache::new("channel_client"),
            conversations: ComponentCache::new("conversation_manager"),
            recoveries: ComponentCache::new("recovery_manager"),
            sweep_cancel: CancellationToken::new(),
        });
        factory.spawn_sweep_task();
        info!(
            sweep_interval_secs = factory.config.factory.sweep_interval_secs,
            max_idle_secs = factory.config.factory.max_idle_secs,
            per_user_cap = factory.config.factory.per_user_cap,
            "component factory started"
        );
        factory
    }

    /// The user's channel client, constructing one if none is cached.
    ///
    /// A transport construction failure propagates to the caller and nothing
    /// is cached.
    pub async fn channel_client(&self, user_id: &str) -> Result<Arc<ChannelClient>, ConvoyError> {
        if let Some(client) = self.channels.get(user_id) {
            return Ok(client);
        }

        let gate = self.channels.construction_gate(user_id);
        let _constructing = gate.lock().await;
        // Re-check under the gate: a concurrent caller may have just won.
        if let Some(client) = self.channels.get(user_id) {
            return Ok(client);
        }

        let transport = self.transports.transport_for(user_id)?;
        let client = Arc::new(ChannelClient::new(user_id, transport, &self.config.channel));
        debug!(user_id, "channel client constructed");

        let evicted = self
            .channels
            .insert(user_id, client.clone(), self.config.factory.per_user_cap);
        dispose_all(evicted).await;
        Ok(client)
    }

    /// The user's recovery manager, constructing one if none is cached.
    pub async fn recovery_manager(&self, user_id: &str) -> Result<Arc<RecoveryManager>, ConvoyError> {
        if let Some(manager) = self.recoveries.get(user_id) {
            return Ok(manager);
        }

        let gate = self.recoveries.construction_gate(user_id);
        let _constructing = gate.lock().await;
        if let Some(manager) = self.recoveries.get(user_id) {
            return Ok(manager);
        }

        let manager = Arc::new(RecoveryManager::new(
            user_id,
            Arc::clone(&self.durable),
            Arc::clone(&self.volatile),
            self.config.recovery.clone(),
        ));
        debug!(user_id, "recovery manager constructed");

        let evicted = self
            .recoveries
            .insert(user_id, manager.clone(), self.config.factory.per_user_cap);
        dispose_all(evicted).await;
        Ok(manager)
    }

    /// The user's conversation manager, composed from the same user's channel
    /// client and recovery manager.
    pub async fn conversation_manager(
        &self,
        user_id: &str,
    ) -> Result<Arc<ConversationManager>, ConvoyError> {
        if let Some(manager) = self.conversations.get(user_id) {
            return Ok(manager);
        }

        let gate = self.conversations.construction_gate(user_id);
        let _constructing = gate.lock().await;
        if let Some(manager) = self.conversations.get(user_id) {
            return Ok(manager);
        }

        let channel = self.channel_client(user_id).await?;
        let recovery = self.recovery_manager(user_id).await?;
        let manager =
            ConversationManager::new(user_id, channel, recovery, self.config.queue.clone()).await;
        debug!(user_id, "conversation manager constructed");

        let evicted = self
            .conversations
            .insert(user_id, manager.clone(), self.config.factory.per_user_cap);
        dispose_all(evicted).await;
        Ok(manager)
    }

    /// Disposes and evicts every instance belonging to `user_id`. Idempotent.
    pub async fn cleanup_user(&self, user_id: &str) {
        // Conversations first: they hold the channel and recovery instances.
        let conversations = self.conversations.remove_user(user_id);
        let channels = self.channels.remove_user(user_id);
        let recoveries = self.recoveries.remove_user(user_id);
        let removed = conversations.len() + channels.len() + recoveries.len();

        dispose_all(conversations).await;
        dispose_all(channels).await;
        dispose_all(recoveries).await;

        if removed > 0 {
            info!(user_id, removed, "user components cleaned up");
        }
    }

    /// Disposes every cached instance and stops the sweep task.
    pub async fn shutdown(&self) {
        self.sweep_cancel.cancel();

        let conversations = self.conversations.drain_all();
        let channels = self.channels.drain_all();
        let recoveries = self.recoveries.drain_all();
        let disposed = conversations.len() + channels.len() + recoveries.len();

        dispose_all(conversations).await;
        dispose_all(channels).await;
        dispose_all(recoveries).await;

        info!(disposed, "component factory shut down");
    }

    /// Total cached instances across all kinds, for diagnostics.
    pub fn cached_instances(&self) -> usize {
        self.channels.count() + self.conversations.count() + self.recoveries.count()
    }

    fn spawn_sweep_task(self: &Arc<Self>) {
        let factory = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(
                factory.config.factory.sweep_interval_secs,
            ));
            // The first tick of a tokio interval fires immediately.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = factory.sweep_cancel.cancelled() => break,
                    _ = tick.tick() => factory.sweep_idle().await,
                }
            }
        });
    }

    async fn sweep_idle(&self) {
        let max_idle = Duration::from_secs(self.config.factory.max_idle_secs);

        let conversations = self.conversations.sweep(max_idle);
        let channels = self.channels.sweep(max_idle);
        let recoveries = self.recoveries.sweep(max_idle);
        let evicted = conversations.len() + channels.len() + recoveries.len();

        dispose_all(conversations).await;
        dispose_all(channels).await;
        dispose_all(recoveries).await;

        if evicted > 0 {
            info!(evicted, "idle components swept");
        } else {
            debug!("sweep pass found nothing idle");
        }
    }
}

impl Drop for ComponentFactory {
    fn drop(&mut self) {
        self.sweep_cancel.cancel();
        if self.cached_instances() > 0 {
            warn!("factory dropped with undisposed instances, call shutdown() first");
        }
    }
}

async fn dispose_all<T: UserComponent>(instances: Vec<Arc<T>>) {
    for instance in instances {
        instance.dispose().await;
    }
}
