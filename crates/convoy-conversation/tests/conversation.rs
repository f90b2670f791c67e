// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue ordering, retry, correlation, and event handling scenarios.
//!
//! All tests run with the clock paused; timer-bound waits (retry delays, the
//! response timeout) resolve through auto-advance, so the scenarios are
//! deterministic without real sleeps.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use convoy_channel::ChannelClient;
use convoy_config::model::{ChannelConfig, QueueConfig, RecoveryConfig};
use convoy_conversation::ConversationManager;
use convoy_core::{MessageStatus, UserComponent};
use convoy_recovery::{MemoryStore, RecoveryManager};
use convoy_test_utils::MockTransport;

struct Fixture {
    transport: Arc<MockTransport>,
    recovery: Arc<RecoveryManager>,
    manager: Arc<ConversationManager>,
}

async fn fixture() -> Fixture {
    convoy_test_utils::init_test_logging();
    let transport = Arc::new(MockTransport::new());
    let channel = Arc::new(ChannelClient::new(
        "u1",
        transport.clone(),
        &ChannelConfig::default(),
    ));
    let recovery = Arc::new(RecoveryManager::new(
        "u1",
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        RecoveryConfig::default(),
    ));
    let manager =
        ConversationManager::new("u1", channel, recovery.clone(), QueueConfig::default()).await;

    Fixture {
        transport,
        recovery,
        manager,
    }
}

/// Lets the pump and inbound tasks drain injected frames.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn send_message_appends_optimistically_then_delivers() {
    let fx = fixture().await;

    let message = fx.manager.send_message("hello").await;
    let state = fx.manager.state().await;
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].id, message.id);

    fx.manager.process_queue().await;

    let state = fx.manager.state().await;
    assert_eq!(state.messages[0].status, MessageStatus::Sent);
    assert_eq!(fx.manager.queue_len().await, 0);

    let frames = fx.transport.sent_frames().await;
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains("hello"));
    assert!(frames[0].contains(&message.id));
}

#[tokio::test(start_paused = true)]
async fn messages_are_sent_in_fifo_order() {
    let fx = fixture().await;

    fx.manager.send_message("first").await;
    fx.manager.send_message("second").await;
    fx.manager.send_message("third").await;
    fx.manager.process_queue().await;

    let frames = fx.transport.sent_frames().await;
    assert_eq!(frames.len(), 3);
    assert!(frames[0].contains("first"));
    assert!(frames[1].contains("second"));
    assert!(frames[2].contains("third"));
}

#[tokio::test(start_paused = true)]
async fn failed_send_requeues_to_back_and_eventually_delivers() {
    let fx = fixture().await;
    fx.transport.fail_next_sends(1);

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let recorded = statuses.clone();
    let message = fx.manager.send_message("Hello").await;
    let id = message.id.clone();
    fx.manager.observe(move |state| {
        if let Some(m) = state.messages.iter().find(|m| m.id == id) {
            recorded.lock().unwrap().push(m.status);
        }
        Ok(())
    });

    fx.manager.process_queue().await;
    let state = fx.manager.state().await;
    assert_eq!(state.messages[0].status, MessageStatus::Pending);
    assert_eq!(state.messages[0].retries, 1);
    assert_eq!(fx.manager.queue_len().await, 1);

    // The retry delay elapses and the ticker picks the item back up.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    fx.manager.process_queue().await;

    let state = fx.manager.state().await;
    assert_eq!(state.messages[0].status, MessageStatus::Sent);
    assert_eq!(fx.manager.queue_len().await, 0);

    let observed = statuses.lock().unwrap().clone();
    let resend_at = observed
        .iter()
        .position(|s| *s == MessageStatus::Sending)
        .unwrap();
    assert!(observed[resend_at..].contains(&MessageStatus::Sent));
}

#[tokio::test(start_paused = true)]
async fn timed_out_send_is_requeued_then_delivered() {
    let fx = fixture().await;
    // Hold the first send in flight past the per-message timeout.
    fx.transport.set_send_delay_ms(31_000);

    fx.manager.send_message("slow wire").await;
    fx.manager.process_queue().await;

    let state = fx.manager.state().await;
    assert_eq!(state.messages[0].status, MessageStatus::Pending);
    assert_eq!(state.messages[0].retries, 1);
    assert_eq!(fx.manager.queue_len().await, 1);
    assert_eq!(fx.transport.sent_count().await, 0);

    // The wire recovers, the retry delay elapses, and delivery succeeds.
    fx.transport.set_send_delay_ms(0);
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    fx.manager.process_queue().await;

    let state = fx.manager.state().await;
    assert_eq!(state.messages[0].status, MessageStatus::Sent);
    assert_eq!(fx.manager.queue_len().await, 0);
    assert_eq!(fx.transport.sent_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_mark_the_message_failed() {
    let fx = fixture().await;
    fx.transport.fail_next_sends(3);

    fx.manager.send_message("doomed").await;
    // Enough paused time for all three attempts and their growing delays.
    tokio::time::sleep(Duration::from_secs(10)).await;

    let state = fx.manager.state().await;
    assert_eq!(state.messages[0].status, MessageStatus::Failed);
    assert_eq!(fx.manager.queue_len().await, 0);
    assert_eq!(fx.transport.sent_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn completion_with_matching_reply_to_advances_the_queue() {
    let fx = fixture().await;

    let message = fx.manager.send_message("Hello").await;

    // Let the send land, then answer while the queue waits for completion.
    settle().await;
    fx.transport
        .inject_event(
            "agent_completed",
            json!({
                "reply_to": message.id,
                "response": "Hi there",
                "thread_id": "t-9",
            }),
        )
        .await;
    fx.manager.process_queue().await;

    let state = fx.manager.state().await;
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].status, MessageStatus::Received);
    assert_eq!(state.messages[1].text, "Hi there");
    assert_eq!(state.thread_id.as_deref(), Some("t-9"));
    assert_eq!(fx.manager.queue_len().await, 0);
}

#[tokio::test(start_paused = true)]
async fn completion_arriving_during_the_send_is_not_missed() {
    let fx = fixture().await;
    // Hold the connect so the reply is already queued on the wire when the
    // inbound pump starts.
    fx.transport.set_connect_delay_ms(100);

    let started = tokio::time::Instant::now();
    let message = fx.manager.send_message("Hello").await;
    fx.transport
        .inject_event(
            "agent_completed",
            json!({"reply_to": message.id, "response": "Hi there"}),
        )
        .await;
    fx.manager.process_queue().await;

    // The reply correlated instead of the queue stalling out the full
    // response window.
    assert!(started.elapsed() < Duration::from_secs(60));
    let state = fx.manager.state().await;
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[0].status, MessageStatus::Sent);
    assert_eq!(state.messages[1].text, "Hi there");
    assert_eq!(fx.manager.queue_len().await, 0);
}

#[tokio::test(start_paused = true)]
async fn silent_agent_resolves_the_response_wait_and_the_queue_advances() {
    let fx = fixture().await;
    let started = tokio::time::Instant::now();

    fx.manager.send_message("first").await;
    fx.manager.send_message("second").await;
    fx.manager.process_queue().await;

    // No completion ever arrived; each message waited out the response
    // window and the next one still went.
    let frames = fx.transport.sent_frames().await;
    assert_eq!(frames.len(), 2);
    assert!(frames[0].contains("first"));
    assert!(frames[1].contains("second"));
    assert_eq!(fx.manager.queue_len().await, 0);
    let state = fx.manager.state().await;
    assert!(state.messages.iter().all(|m| m.status == MessageStatus::Sent));
    assert!(started.elapsed() >= Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn agent_events_update_run_tracking_and_history() {
    let fx = fixture().await;
    // Connect so the inbound pump is running before any events arrive.
    fx.manager.send_message("warmup").await;
    fx.manager.process_queue().await;

    fx.transport
        .inject_event("agent_started", json!({"run_id": "run-1"}))
        .await;
    settle().await;
    let state = fx.manager.state().await;
    assert_eq!(state.active_run_id.as_deref(), Some("run-1"));
    assert!(state.is_processing);

    fx.transport
        .inject_event(
            "agent_completed",
            json!({
                "run_id": "run-1",
                "response": "done",
                "uvs_context": {"report_type": "summary", "has_data": true},
            }),
        )
        .await;
    settle().await;
    let state = fx.manager.state().await;
    assert!(state.active_run_id.is_none());
    assert!(!state.is_processing);
    let last = state.messages.last().unwrap();
    assert_eq!(last.text, "done");
    assert_eq!(last.status, MessageStatus::Received);
    let uvs = state.uvs_context.unwrap();
    assert_eq!(uvs.report_type.as_deref(), Some("summary"));
    assert!(uvs.has_data);

    fx.transport
        .inject_event("agent_error", json!({"error": "model overloaded"}))
        .await;
    settle().await;
    let state = fx.manager.state().await;
    assert_eq!(state.messages.last().unwrap().text, "model overloaded");
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_only_the_inflight_send() {
    let fx = fixture().await;
    fx.transport.set_connect_delay_ms(5_000);

    let message = fx.manager.send_message("stuck").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    fx.manager.cancel_current_message();
    fx.manager.process_queue().await;

    // Still queued, not counted as an attempt, history untouched.
    assert_eq!(fx.manager.queue_len().await, 1);
    let state = fx.manager.state().await;
    assert_eq!(state.messages[0].id, message.id);
    assert_eq!(state.messages[0].status, MessageStatus::Pending);
    assert_eq!(state.messages[0].retries, 0);

    fx.manager.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn clear_queue_drops_pending_items_but_keeps_history() {
    let fx = fixture().await;
    fx.transport.set_connect_delay_ms(60_000);

    fx.manager.send_message("one").await;
    fx.manager.send_message("two").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    fx.manager.clear_queue().await;
    assert_eq!(fx.manager.queue_len().await, 0);
    assert_eq!(fx.manager.state().await.messages.len(), 2);

    fx.manager.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn manager_starts_from_recovered_state() {
    let transport = Arc::new(MockTransport::new());
    let channel = Arc::new(ChannelClient::new(
        "u1",
        transport,
        &ChannelConfig::default(),
    ));
    let recovery = Arc::new(RecoveryManager::new(
        "u1",
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        RecoveryConfig::default(),
    ));

    let mut prior = convoy_core::ConversationState::default();
    prior.messages.push(convoy_core::Message::new(
        "u1",
        "from before the reload",
        convoy_core::MessageRole::User,
    ));
    recovery.save_state(&prior).await.unwrap();

    let manager = ConversationManager::new("u1", channel, recovery, QueueConfig::default()).await;
    let state = manager.state().await;
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].text, "from before the reload");
}

#[tokio::test(start_paused = true)]
async fn observer_errors_never_break_the_mutation_path() {
    let fx = fixture().await;

    fx.manager.observe(|_| {
        Err(convoy_core::ConvoyError::Internal(
            "observer exploded".to_string(),
        ))
    });
    let calls = Arc::new(Mutex::new(0u32));
    let counted = calls.clone();
    fx.manager.observe(move |_| {
        *counted.lock().unwrap() += 1;
        Ok(())
    });

    fx.manager.send_message("resilient").await;
    fx.manager.process_queue().await;

    assert_eq!(fx.manager.state().await.messages.len(), 1);
    assert!(*calls.lock().unwrap() > 0);
}

#[tokio::test(start_paused = true)]
async fn mutations_are_persisted_through_the_recovery_manager() {
    let fx = fixture().await;

    fx.manager.send_message("durable").await;
    fx.manager.process_queue().await;
    fx.manager.dispose().await;

    let recovered = fx.recovery.recover_state().await;
    assert_eq!(recovered.messages.len(), 1);
    assert_eq!(recovered.messages[0].text, "durable");
    assert_eq!(recovered.messages[0].status, MessageStatus::Sent);
}
