// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The fault-tolerant channel client.
//!
//! Wraps a raw [`Transport`] with:
//! - Idempotent integration: concurrent `ensure_integration()` callers await
//!   one shared in-flight connect rather than racing independent attempts.
//! - A circuit breaker around every connect and send operation.
//! - Exponential backoff retry around connect attempts.
//! - Event vocabulary validation at integration time.
//! - A typed subscription surface dispatching normalized [`AgentEvent`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use convoy_config::model::ChannelConfig;
use convoy_core::events::{AgentUpdatePayload, UserMessagePayload, REQUIRED_EVENTS, SUPPORTED_EVENTS};
use convoy_core::{AgentEvent, ConvoyError, OutboundEnvelope, Transport, UserComponent, WILDCARD_EVENT};

use crate::backoff::BackoffPolicy;
use crate::breaker::CircuitBreaker;

type EventHandler = Arc<dyn Fn(&AgentEvent) -> Result<(), ConvoyError> + Send + Sync>;
type HandlerMap = Arc<StdMutex<HashMap<String, Vec<(u64, EventHandler)>>>>;
type SharedConnect = Shared<BoxFuture<'static, Result<(), Arc<ConvoyError>>>>;

/// Reliable-looking request/response and subscribe surface over an
/// inherently unreliable bidirectional channel. One instance per user.
pub struct ChannelClient {
    user_id: String,
    transport: Arc<dyn Transport>,
    breaker: Arc<Mutex<CircuitBreaker>>,
    backoff: BackoffPolicy,
    /// Event vocabulary this client supports; checked against the required
    /// set at integration time.
    supported_events: Arc<Vec<String>>,
    handlers: HandlerMap,
    next_handler_id: AtomicU64,
    /// Single-slot cache for the in-flight connect future.
    connect_slot: Arc<Mutex<Option<SharedConnect>>>,
    pump_cancel: Arc<StdMutex<Option<CancellationToken>>>,
}

impl ChannelClient {
    pub fn new(user_id: impl Into<String>, transport: Arc<dyn Transport>, config: &ChannelConfig) -> Self {
        let user_id = user_id.into();
        info!(user_id = %user_id, "channel client created");
        Self {
            user_id,
            transport,
            breaker: Arc::new(Mutex::new(CircuitBreaker::new(config))),
            backoff: BackoffPolicy::new(config),
            supported_events: Arc::new(
                SUPPORTED_EVENTS.iter().map(|s| s.to_string()).collect(),
            ),
            handlers: Arc::new(StdMutex::new(HashMap::new())),
            next_handler_id: AtomicU64::new(0),
            connect_slot: Arc::new(Mutex::new(None)),
            pump_cancel: Arc::new(StdMutex::new(None)),
        }
    }

    /// Replaces the supported event vocabulary. Test seam for integration
    /// failure scenarios.
    pub fn with_supported_events(mut self, events: Vec<String>) -> Self {
        self.supported_events = Arc::new(events);
        self
    }

    /// Integrates only if not already integrated.
    ///
    /// Already integrated means a live connection with the inbound pump
    /// running; a host handing over a pre-connected transport still gets
    /// vocabulary validation and the pump start.
    ///
    /// Concurrent callers collapse into the single in-flight connect attempt:
    /// the first caller installs a shared future in the slot, late joiners
    /// clone and await it, and all observe the same outcome.
    pub async fn ensure_integration(&self) -> Result<(), ConvoyError> {
        if self.transport.is_connected() && lock_poisonless(&self.pump_cancel).is_some() {
            return Ok(());
        }

        let fut = {
            let mut slot = self.connect_slot.lock().await;
            match slot.as_ref() {
                Some(inflight) => inflight.clone(),
                None => {
                    let fut = Self::integrate(
                        self.user_id.clone(),
                        Arc::clone(&self.transport),
                        Arc::clone(&self.breaker),
                        self.backoff.clone(),
                        Arc::clone(&self.supported_events),
                        Arc::clone(&self.handlers),
                        Arc::clone(&self.pump_cancel),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        let result = fut.clone().await;

        // Clear the slot so a later disconnect can trigger a fresh attempt.
        // Only the future we awaited is cleared; a newer in-flight attempt
        // installed meanwhile stays put.
        {
            let mut slot = self.connect_slot.lock().await;
            if let Some(current) = slot.as_ref()
                && current.ptr_eq(&fut)
            {
                *slot = None;
            }
        }

        result.map_err(|e| e.clone_flattened())
    }

    /// The full integration sequence: breaker-guarded backoff-retried connect,
    /// vocabulary validation, then starting the inbound pump.
    async fn integrate(
        user_id: String,
        transport: Arc<dyn Transport>,
        breaker: Arc<Mutex<CircuitBreaker>>,
        backoff: BackoffPolicy,
        supported: Arc<Vec<String>>,
        handlers: HandlerMap,
        pump_cancel: Arc<StdMutex<Option<CancellationToken>>>,
    ) -> Result<(), Arc<ConvoyError>> {
        // Vocabulary is checked before touching the network: a client that
        // cannot represent the required events must never report a healthy
        // integration, connected or not.
        Self::validate_vocabulary(&supported).map_err(Arc::new)?;

        Self::connect_with_retry(&user_id, &transport, &breaker, &backoff)
            .await
            .map_err(Arc::new)?;

        // Restart the inbound pump, replacing any stale one.
        let token = CancellationToken::new();
        if let Some(old) = lock_poisonless(&pump_cancel).replace(token.clone()) {
            old.cancel();
        }
        tokio::spawn(Self::pump(
            user_id.clone(),
            Arc::clone(&transport),
            handlers,
            token,
        ));

        info!(user_id = %user_id, "channel integration complete");
        Ok(())
    }

    async fn connect_with_retry(
        user_id: &str,
        transport: &Arc<dyn Transport>,
        breaker: &Arc<Mutex<CircuitBreaker>>,
        backoff: &BackoffPolicy,
    ) -> Result<(), ConvoyError> {
        let mut last_err: Option<ConvoyError> = None;

        for attempt in 1..=backoff.max_attempts() {
            breaker.lock().await.try_acquire()?;

            match transport.connect().await {
                Ok(()) => {
                    breaker.lock().await.record_success();
                    debug!(user_id = %user_id, attempt, "transport connected");
                    return Ok(());
                }
                Err(e) => {
                    breaker.lock().await.record_failure();
                    warn!(
                        user_id = %user_id,
                        attempt,
                        error = %e,
                        "connect attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < backoff.max_attempts() {
                        tokio::time::sleep(backoff.delay_for(attempt)).await;
                    }
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ConvoyError::transport("connect failed with no attempts made")))
    }

    /// Asserts the required agent events are in the supported vocabulary.
    fn validate_vocabulary(supported: &[String]) -> Result<(), ConvoyError> {
        let missing: Vec<String> = REQUIRED_EVENTS
            .iter()
            .filter(|required| !supported.iter().any(|s| s == *required))
            .map(|s| s.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConvoyError::Integration { missing })
        }
    }

    /// Inbound pump: receives raw frames, normalizes them, dispatches to
    /// subscribers. Runs until cancelled or the transport closes.
    async fn pump(
        user_id: String,
        transport: Arc<dyn Transport>,
        handlers: HandlerMap,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(user_id = %user_id, "inbound pump cancelled");
                    break;
                }
                frame = transport.receive() => match frame {
                    Ok(raw) => match AgentEvent::parse(&raw) {
                        Ok(event) => Self::dispatch(&user_id, &handlers, &event),
                        Err(e) => {
                            warn!(
                                user_id = %user_id,
                                error = %e,
                                "dropping malformed inbound frame"
                            );
                        }
                    },
                    Err(e) => {
                        warn!(
                            user_id = %user_id,
                            error = %e,
                            "channel receive error, stopping pump"
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Invokes every handler registered for the event's type plus wildcard
    /// subscribers. A failing handler is logged and never prevents the
    /// remaining handlers from running.
    fn dispatch(user_id: &str, handlers: &HandlerMap, event: &AgentEvent) {
        let matching: Vec<(u64, EventHandler)> = {
            let map = lock_poisonless(handlers);
            let mut out = Vec::new();
            if let Some(list) = map.get(&event.event_type) {
                out.extend(list.iter().cloned());
            }
            if let Some(list) = map.get(WILDCARD_EVENT) {
                out.extend(list.iter().cloned());
            }
            out
        };

        for (id, handler) in matching {
            if let Err(e) = handler(event) {
                warn!(
                    user_id = %user_id,
                    handler_id = id,
                    event_type = %event.event_type,
                    error = %e,
                    "event handler failed"
                );
            }
        }
    }

    /// Registers a handler for `event_type` (or [`WILDCARD_EVENT`] for all
    /// events). Returns a [`Subscription`] whose `unsubscribe()` removes the
    /// handler.
    pub fn on(
        &self,
        event_type: &str,
        handler: impl Fn(&AgentEvent) -> Result<(), ConvoyError> + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        lock_poisonless(&self.handlers)
            .entry(event_type.to_string())
            .or_default()
            .push((id, Arc::new(handler)));

        debug!(
            user_id = %self.user_id,
            event_type = event_type,
            handler_id = id,
            "event handler registered"
        );

        Subscription {
            id,
            event_type: event_type.to_string(),
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Sends a `user_message` envelope, integrating first if needed.
    pub async fn send_user_message(&self, payload: UserMessagePayload) -> Result<(), ConvoyError> {
        self.ensure_integration().await?;
        self.send_envelope(OutboundEnvelope::UserMessage(payload)).await
    }

    /// Sends an `agent_update` envelope, integrating first if needed.
    pub async fn send_agent_update(&self, payload: AgentUpdatePayload) -> Result<(), ConvoyError> {
        self.ensure_integration().await?;
        self.send_envelope(OutboundEnvelope::AgentUpdate(payload)).await
    }

    async fn send_envelope(&self, envelope: OutboundEnvelope) -> Result<(), ConvoyError> {
        let frame = envelope.to_frame()?;

        self.breaker.lock().await.try_acquire()?;
        match self.transport.send(&frame).await {
            Ok(()) => {
                self.breaker.lock().await.record_success();
                Ok(())
            }
            Err(e) => {
                self.breaker.lock().await.record_failure();
                Err(e)
            }
        }
    }
}

#[async_trait]
impl UserComponent for ChannelClient {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn dispose(&self) {
        if let Some(token) = lock_poisonless(&self.pump_cancel).take() {
            token.cancel();
        }
        self.transport.disconnect().await;
        info!(user_id = %self.user_id, "channel client disposed");
    }
}

/// Handle to a registered event handler.
///
/// Unsubscribing is explicit; dropping the handle leaves the handler
/// registered for the lifetime of the client.
pub struct Subscription {
    id: u64,
    event_type: String,
    handlers: Weak<StdMutex<HashMap<String, Vec<(u64, EventHandler)>>>>,
}

impl Subscription {
    /// Removes the handler this subscription refers to.
    pub fn unsubscribe(self) {
        if let Some(handlers) = self.handlers.upgrade() {
            let mut map = lock_poisonless(&handlers);
            if let Some(list) = map.get_mut(&self.event_type) {
                list.retain(|(id, _)| *id != self.id);
                if list.is_empty() {
                    map.remove(&self.event_type);
                }
            }
        }
    }
}

/// Locks a std mutex, recovering the inner data if a panicking handler
/// poisoned it.
fn lock_poisonless<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
