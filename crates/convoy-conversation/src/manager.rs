// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-user conversation manager.
//!
//! Owns one user's message history and the FIFO send queue in front of the
//! channel client. Sends are strictly serialized: one in-flight message at a
//! time, with the correlated agent completion awaited before the queue
//! advances. A failed send is requeued to the back with an
//! attempt-proportional delay, so a persistently failing message cannot
//! starve the rest of the conversation. Every state mutation is persisted
//! through the recovery manager and fanned out to registered observers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{interval, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use convoy_channel::{ChannelClient, Subscription};
use convoy_config::model::QueueConfig;
use convoy_core::events::{event_types, UserMessagePayload};
use convoy_core::types::now_millis;
use convoy_core::{
    AgentEvent, ConversationState, ConvoyError, Message, MessageRole, MessageStatus,
    UserComponent, UvsContext,
};
use convoy_recovery::RecoveryManager;

use crate::queue::QueueItem;

type ProcessingRun = Shared<BoxFuture<'static, ()>>;
type Observer = Arc<dyn Fn(&ConversationState) -> Result<(), ConvoyError> + Send + Sync>;

/// Why a send attempt did not succeed.
enum SendFailure {
    /// Aborted by `cancel_current_message()`; not counted as an attempt.
    Cancelled,
    Error(ConvoyError),
}

/// Serializes one user's outbound sends and correlates inbound completions.
pub struct ConversationManager {
    user_id: String,
    channel: Arc<ChannelClient>,
    recovery: Arc<RecoveryManager>,
    config: QueueConfig,
    state: Mutex<ConversationState>,
    queue: Mutex<VecDeque<QueueItem>>,
    /// Re-entrancy guard: a second trigger awaits the same processing run.
    processing: StdMutex<Option<ProcessingRun>>,
    /// Message id and waker for the completion the queue is blocked on.
    pending_completion: StdMutex<Option<(String, oneshot::Sender<()>)>>,
    /// Cancel token for the in-flight send only; the queue is untouched.
    current_send_cancel: StdMutex<Option<CancellationToken>>,
    observers: StdMutex<Vec<(u64, Observer)>>,
    next_observer_id: AtomicU64,
    subscriptions: StdMutex<Vec<Subscription>>,
    shutdown: CancellationToken,
}

impl ConversationManager {
    /// Creates the manager, recovering the user's prior state, and starts the
    /// inbound event task and the idle-queue ticker.
    pub async fn new(
        user_id: impl Into<String>,
        channel: Arc<ChannelClient>,
        recovery: Arc<RecoveryManager>,
        config: QueueConfig,
    ) -> Arc<Self> {
        let user_id = user_id.into();
        let state = recovery.recover_state().await;

        let manager = Arc::new(Self {
            user_id: user_id.clone(),
            channel,
            recovery,
            config,
            state: Mutex::new(state),
            queue: Mutex::new(VecDeque::new()),
            processing: StdMutex::new(None),
            pending_completion: StdMutex::new(None),
            current_send_cancel: StdMutex::new(None),
            observers: StdMutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(0),
            subscriptions: StdMutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        });

        manager.spawn_inbound_task();
        manager.spawn_ticker();
        info!(user_id = %user_id, "conversation manager created");
        manager
    }

    /// Appends a pending message optimistically, enqueues it, and triggers
    /// queue processing. Returns the message as appended.
    pub async fn send_message(self: &Arc<Self>, text: impl Into<String>) -> Message {
        let message = Message::new(&self.user_id, text, MessageRole::User);
        {
            let mut state = self.state.lock().await;
            state.messages.push(message.clone());
            state.touch();
        }
        self.persist_and_notify().await;

        self.queue
            .lock()
            .await
            .push_back(QueueItem::new(&message.id, &message.text));
        debug!(user_id = %self.user_id, message_id = %message.id, "message enqueued");

        self.trigger_processing();
        message
    }

    /// Awaits the current processing run, starting one if the queue is idle.
    pub async fn process_queue(self: &Arc<Self>) {
        self.trigger_processing();
        let run = lock_poisonless(&self.processing).clone();
        if let Some(run) = run {
            run.await;
        }
    }

    /// Aborts the in-flight network send, if any. The queue and the message
    /// history are left untouched.
    pub fn cancel_current_message(&self) {
        if let Some(token) = lock_poisonless(&self.current_send_cancel).take() {
            token.cancel();
            info!(user_id = %self.user_id, "in-flight send cancelled");
        }
    }

    /// Drops all queued items. Sent and received history is untouched.
    pub async fn clear_queue(&self) {
        let dropped = {
            let mut queue = self.queue.lock().await;
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            info!(user_id = %self.user_id, dropped, "send queue cleared");
        }
    }

    /// Registers a state-change observer; returns an id for [`unobserve`].
    ///
    /// Observers run after every persisted mutation with a snapshot of the
    /// state. An observer error is logged and never breaks the mutation path.
    ///
    /// [`unobserve`]: Self::unobserve
    pub fn observe(
        &self,
        observer: impl Fn(&ConversationState) -> Result<(), ConvoyError> + Send + Sync + 'static,
    ) -> u64 {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        lock_poisonless(&self.observers).push((id, Arc::new(observer)));
        id
    }

    pub fn unobserve(&self, id: u64) {
        lock_poisonless(&self.observers).retain(|(other, _)| *other != id);
    }

    /// Snapshot of the current conversation state.
    pub async fn state(&self) -> ConversationState {
        self.state.lock().await.clone()
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Starts a processing run unless one is already active. Concurrent
    /// callers share the active run's future instead of racing it.
    fn trigger_processing(self: &Arc<Self>) {
        let mut slot = lock_poisonless(&self.processing);
        if slot.is_some() {
            return;
        }

        let manager = Arc::clone(self);
        let run = async move {
            manager.run_queue().await;
            *lock_poisonless(&manager.processing) = None;
        }
        .boxed()
        .shared();

        *slot = Some(run.clone());
        drop(slot);
        tokio::spawn(run);
    }

    /// The serialized queue-processing loop. At most one in-flight message.
    async fn run_queue(&self) {
        loop {
            let item = {
                let queue = self.queue.lock().await;
                match queue.front() {
                    Some(item) if item.ready(Instant::now()) => item.clone(),
                    _ => break,
                }
            };

            self.set_status(&item.message_id, MessageStatus::Sending).await;

            // The waiter is registered before the send goes out: the agent
            // may reply in the window between the transport accepting the
            // frame and the Sent status being persisted, and that completion
            // must not be dropped.
            let completion = self.register_completion(&item.message_id);

            match self.attempt_send(&item).await {
                Ok(()) => {
                    self.pop_if_head(&item.message_id).await;
                    self.set_status(&item.message_id, MessageStatus::Sent).await;
                    self.await_completion(&item.message_id, completion).await;
                }
                Err(SendFailure::Cancelled) => {
                    self.clear_completion(&item.message_id);
                    // The item stays at the head for the caller to decide on.
                    self.set_status(&item.message_id, MessageStatus::Pending).await;
                    break;
                }
                Err(SendFailure::Error(e)) => {
                    self.clear_completion(&item.message_id);
                    let attempts = item.attempts + 1;
                    let mut queue = self.queue.lock().await;
                    // The queue may have been cleared mid-send.
                    if !queue.front().is_some_and(|head| head.message_id == item.message_id) {
                        continue;
                    }
                    queue.pop_front();

                    if attempts >= self.config.max_attempts {
                        drop(queue);
                        warn!(
                            user_id = %self.user_id,
                            message_id = %item.message_id,
                            attempts,
                            error = %e,
                            "message failed permanently"
                        );
                        self.set_status(&item.message_id, MessageStatus::Failed).await;
                    } else {
                        let delay = Duration::from_millis(
                            self.config.retry_delay_ms.saturating_mul(attempts as u64),
                        );
                        queue.push_back(item.retried(attempts, Instant::now() + delay));
                        drop(queue);
                        debug!(
                            user_id = %self.user_id,
                            message_id = %item.message_id,
                            attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "send failed, requeued"
                        );
                        self.mark_retried(&item.message_id, attempts).await;
                    }
                }
            }
        }
    }

    /// Pops the head item if it is still the one just attempted; the queue
    /// may have been cleared while the send was in flight.
    async fn pop_if_head(&self, message_id: &str) {
        let mut queue = self.queue.lock().await;
        if queue.front().is_some_and(|head| head.message_id == message_id) {
            queue.pop_front();
        }
    }

    /// One send attempt: the channel send raced against the message timeout
    /// and the caller's cancel token.
    async fn attempt_send(&self, item: &QueueItem) -> Result<(), SendFailure> {
        let thread_id = self.state.lock().await.thread_id.clone();
        let payload = UserMessagePayload {
            message: item.text.clone(),
            thread_id,
            timestamp: now_millis(),
            message_id: item.message_id.clone(),
        };

        let cancel = CancellationToken::new();
        *lock_poisonless(&self.current_send_cancel) = Some(cancel.clone());

        let send_timeout = Duration::from_secs(self.config.message_timeout_secs);
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(SendFailure::Cancelled),
            sent = timeout(send_timeout, self.channel.send_user_message(payload)) => match sent {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(SendFailure::Error(e)),
                Err(_) => Err(SendFailure::Error(ConvoyError::Timeout {
                    duration: send_timeout,
                })),
            },
        };

        *lock_poisonless(&self.current_send_cancel) = None;
        result
    }

    /// Installs the completion waiter for `message_id`.
    fn register_completion(&self, message_id: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *lock_poisonless(&self.pending_completion) = Some((message_id.to_string(), tx));
        rx
    }

    /// Removes the waiter if it is still the one registered for `message_id`.
    fn clear_completion(&self, message_id: &str) {
        let mut slot = lock_poisonless(&self.pending_completion);
        if slot.as_ref().is_some_and(|(id, _)| id == message_id) {
            *slot = None;
        }
    }

    /// Blocks queue advancement on the correlated `agent_completed` event,
    /// bounded by the response timeout. The timeout resolves the wait rather
    /// than failing it, so a silent agent cannot deadlock the queue.
    async fn await_completion(&self, message_id: &str, rx: oneshot::Receiver<()>) {
        let wait = Duration::from_secs(self.config.response_timeout_secs);
        match timeout(wait, rx).await {
            Ok(Ok(())) => {
                debug!(user_id = %self.user_id, message_id, "completion correlated")
            }
            Ok(Err(_)) => debug!(user_id = %self.user_id, message_id, "completion wait dropped"),
            Err(_) => debug!(
                user_id = %self.user_id,
                message_id,
                waited_secs = self.config.response_timeout_secs,
                "response wait elapsed, advancing queue"
            ),
        }

        self.clear_completion(message_id);
    }

    /// Routes channel events into an owned task so handling can persist state
    /// without blocking the dispatch path.
    fn spawn_inbound_task(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<AgentEvent>();

        let kinds = [
            event_types::AGENT_STARTED,
            event_types::AGENT_COMPLETED,
            event_types::AGENT_ERROR,
        ];
        let subscriptions = kinds
            .into_iter()
            .map(|kind| {
                let tx = tx.clone();
                self.channel.on(kind, move |event| {
                    tx.send(event.clone())
                        .map_err(|_| ConvoyError::Internal("inbound event task gone".to_string()))
                })
            })
            .collect();
        *lock_poisonless(&self.subscriptions) = subscriptions;

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => manager.handle_event(event).await,
                        None => break,
                    },
                }
            }
        });
    }

    /// Retriggers processing so a message enqueued while the loop was idle
    /// (or parked on a retry delay) is not stranded.
    fn spawn_ticker(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_millis(manager.config.tick_interval_ms));
            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        if !manager.queue.lock().await.is_empty() {
                            manager.trigger_processing();
                        }
                    }
                }
            }
        });
    }

    async fn handle_event(&self, event: AgentEvent) {
        match event.event_type.as_str() {
            event_types::AGENT_STARTED => {
                {
                    let mut state = self.state.lock().await;
                    state.active_run_id = event.run_id.clone();
                    state.is_processing = true;
                    state.touch();
                }
                debug!(user_id = %self.user_id, run_id = ?event.run_id, "agent run started");
                self.persist_and_notify().await;
            }
            event_types::AGENT_COMPLETED => {
                self.resolve_completion(event.reply_to.as_deref());

                let text = event
                    .data
                    .get("response")
                    .or_else(|| event.data.get("message"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();

                {
                    let mut state = self.state.lock().await;
                    let mut message = Message::new(&self.user_id, text, MessageRole::Assistant);
                    message.status = MessageStatus::Received;
                    state.messages.push(message);

                    if let Some(uvs) = event.data.get("uvs_context") {
                        match serde_json::from_value::<UvsContext>(uvs.clone()) {
                            Ok(ctx) => state.uvs_context = Some(ctx),
                            Err(e) => warn!(
                                user_id = %self.user_id,
                                error = %e,
                                "unparseable uvs context in completion"
                            ),
                        }
                    }
                    if event.thread_id.is_some() {
                        state.thread_id = event.thread_id.clone();
                    }
                    state.active_run_id = None;
                    state.is_processing = false;
                    state.touch();
                }
                debug!(user_id = %self.user_id, reply_to = ?event.reply_to, "agent run completed");
                self.persist_and_notify().await;
            }
            event_types::AGENT_ERROR => {
                let text = event
                    .data
                    .get("error")
                    .or_else(|| event.data.get("message"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("agent reported an unspecified error")
                    .to_string();

                {
                    let mut state = self.state.lock().await;
                    let mut message = Message::new(&self.user_id, text, MessageRole::System);
                    message.status = MessageStatus::Received;
                    state.messages.push(message);
                    state.active_run_id = None;
                    state.is_processing = false;
                    state.touch();
                }
                warn!(user_id = %self.user_id, run_id = ?event.run_id, "agent run errored");
                self.persist_and_notify().await;
            }
            other => debug!(user_id = %self.user_id, event_type = other, "unhandled event kind"),
        }
    }

    /// Wakes the queue if this completion correlates with the message it is
    /// blocked on.
    fn resolve_completion(&self, reply_to: Option<&str>) {
        let Some(reply_to) = reply_to else { return };
        let mut slot = lock_poisonless(&self.pending_completion);
        if slot.as_ref().is_some_and(|(id, _)| id == reply_to)
            && let Some((_, tx)) = slot.take()
        {
            let _ = tx.send(());
        }
    }

    async fn set_status(&self, message_id: &str, status: MessageStatus) {
        {
            let mut state = self.state.lock().await;
            if let Some(message) = state.message_mut(message_id) {
                message.status = status;
            }
            state.touch();
        }
        self.persist_and_notify().await;
    }

    async fn mark_retried(&self, message_id: &str, attempts: u32) {
        {
            let mut state = self.state.lock().await;
            if let Some(message) = state.message_mut(message_id) {
                message.status = MessageStatus::Pending;
                message.retries = attempts;
            }
            state.touch();
        }
        self.persist_and_notify().await;
    }

    /// Persists a snapshot through the recovery manager and fans it out to
    /// observers. Neither a persistence failure nor an observer error is
    /// allowed to break the mutation path; both are logged.
    async fn persist_and_notify(&self) {
        let snapshot = self.state.lock().await.clone();

        if let Err(e) = self.recovery.save_state(&snapshot).await {
            warn!(user_id = %self.user_id, error = %e, "state persistence failed");
        }

        let observers: Vec<(u64, Observer)> = lock_poisonless(&self.observers).clone();
        for (id, observer) in observers {
            if let Err(e) = observer(&snapshot) {
                warn!(
                    user_id = %self.user_id,
                    observer_id = id,
                    error = %e,
                    "state observer failed"
                );
            }
        }
    }
}

#[async_trait]
impl UserComponent for ConversationManager {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn dispose(&self) {
        self.shutdown.cancel();
        self.cancel_current_message();

        let subscriptions = std::mem::take(&mut *lock_poisonless(&self.subscriptions));
        for subscription in subscriptions {
            subscription.unsubscribe();
        }

        let snapshot = self.state.lock().await.clone();
        if let Err(e) = self.recovery.save_state(&snapshot).await {
            warn!(user_id = %self.user_id, error = %e, "final state persist failed");
        }
        info!(user_id = %self.user_id, "conversation manager disposed");
    }
}

/// Locks a std mutex, recovering the inner data if a panicking observer
/// poisoned it.
fn lock_poisonless<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
