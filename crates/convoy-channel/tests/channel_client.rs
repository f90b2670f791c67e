// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the channel client against a mock transport.

use std::sync::Arc;
use std::time::Duration;

use convoy_channel::ChannelClient;
use convoy_config::model::ChannelConfig;
use convoy_core::events::UserMessagePayload;
use convoy_core::{ConvoyError, Transport, UserComponent};
use convoy_test_utils::MockTransport;

fn payload(text: &str) -> UserMessagePayload {
    UserMessagePayload {
        message: text.to_string(),
        thread_id: None,
        timestamp: 1_700_000_000_000,
        message_id: format!("user-1-0-{text}"),
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_ensure_integration_makes_one_connect_attempt() {
    let transport = Arc::new(MockTransport::new());
    transport.set_connect_delay_ms(50);
    let client = Arc::new(ChannelClient::new(
        "user-1",
        transport.clone(),
        &ChannelConfig::default(),
    ));

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let client = Arc::clone(&client);
        tasks.push(tokio::spawn(async move { client.ensure_integration().await }));
    }

    for task in tasks {
        task.await.unwrap().expect("integration should succeed");
    }
    assert_eq!(transport.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn integration_retries_failed_connects_with_backoff() {
    let transport = Arc::new(MockTransport::new());
    transport.fail_next_connects(2);
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default());

    client
        .ensure_integration()
        .await
        .expect("third attempt should succeed");
    assert_eq!(transport.connect_attempts(), 3);
    assert!(transport.is_connected());
}

#[tokio::test(start_paused = true)]
async fn integration_gives_up_after_max_attempts() {
    let transport = Arc::new(MockTransport::new());
    transport.fail_next_connects(100);
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default());

    let err = client
        .ensure_integration()
        .await
        .expect_err("all attempts fail");
    assert!(matches!(err, ConvoyError::Transport { .. }));
    // Default connect_attempts is 5; breaker threshold is also 5 so every
    // attempt was admitted.
    assert_eq!(transport.connect_attempts(), 5);
}

#[tokio::test]
async fn missing_required_events_is_fatal_and_skips_the_network() {
    let transport = Arc::new(MockTransport::new());
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default())
        .with_supported_events(vec!["agent_started".to_string()]);

    let err = client.ensure_integration().await.expect_err("must fail");
    match err {
        ConvoyError::Integration { missing } => {
            assert!(missing.contains(&"agent_completed".to_string()));
        }
        other => panic!("expected Integration error, got {other}"),
    }
    assert_eq!(transport.connect_attempts(), 0);
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn pre_connected_transport_still_gets_the_inbound_pump() {
    let transport = Arc::new(MockTransport::new());
    // The host hands over a transport it already connected itself.
    transport.connect().await.unwrap();
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default());
    client.ensure_integration().await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = client.on("agent_started", move |_| {
        tx.send(()).map_err(|e| ConvoyError::Internal(e.to_string()))
    });
    transport
        .inject_event("agent_started", serde_json::json!({"run_id": "r1"}))
        .await;

    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("events should flow on a handed-over connection")
        .unwrap();
}

#[tokio::test]
async fn pre_connected_transport_does_not_bypass_vocabulary_validation() {
    let transport = Arc::new(MockTransport::new());
    transport.connect().await.unwrap();
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default())
        .with_supported_events(vec!["agent_started".to_string()]);

    let err = client.ensure_integration().await.expect_err("must fail");
    assert!(matches!(err, ConvoyError::Integration { .. }));
}

#[tokio::test]
async fn send_routes_through_transport_after_integration() {
    let transport = Arc::new(MockTransport::new());
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default());

    client.send_user_message(payload("hello")).await.unwrap();

    let frames = transport.sent_frames().await;
    assert_eq!(frames.len(), 1);
    let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(value["type"], "user_message");
    assert_eq!(value["data"]["message"], "hello");
}

#[tokio::test(start_paused = true)]
async fn repeated_send_failures_open_the_circuit() {
    let transport = Arc::new(MockTransport::new());
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default());
    client.ensure_integration().await.unwrap();

    transport.fail_next_sends(5);
    for i in 0..5 {
        let err = client
            .send_user_message(payload(&format!("m{i}")))
            .await
            .expect_err("scripted failure");
        assert!(matches!(err, ConvoyError::Transport { .. }));
    }

    // Circuit is now open: the send is rejected without reaching the transport.
    let err = client
        .send_user_message(payload("rejected"))
        .await
        .expect_err("circuit open");
    assert!(matches!(err, ConvoyError::CircuitOpen { .. }));
    assert_eq!(transport.sent_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn circuit_recovers_through_half_open_trials() {
    let transport = Arc::new(MockTransport::new());
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default());
    client.ensure_integration().await.unwrap();

    transport.fail_next_sends(5);
    for i in 0..5 {
        let _ = client.send_user_message(payload(&format!("m{i}"))).await;
    }

    tokio::time::advance(Duration::from_secs(60)).await;

    // Three half-open successes close the circuit again.
    for i in 0..3 {
        client
            .send_user_message(payload(&format!("trial{i}")))
            .await
            .expect("half-open trial should pass through");
    }
    client
        .send_user_message(payload("after-close"))
        .await
        .expect("circuit closed again");
    assert_eq!(transport.sent_count().await, 4);
}

#[tokio::test]
async fn inbound_events_reach_subscribers_with_correlation_ids() {
    let transport = Arc::new(MockTransport::new());
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default());
    client.ensure_integration().await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = client.on("agent_completed", move |event| {
        tx.send((event.run_id.clone(), event.reply_to.clone()))
            .map_err(|e| ConvoyError::Internal(e.to_string()))
    });

    transport
        .inject_event(
            "agent_completed",
            serde_json::json!({"run_id": "r1", "reply_to": "m1", "message": "done"}),
        )
        .await;

    let (run_id, reply_to) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event should arrive")
        .unwrap();
    assert_eq!(run_id.as_deref(), Some("r1"));
    assert_eq!(reply_to.as_deref(), Some("m1"));
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_breaking_the_pump() {
    let transport = Arc::new(MockTransport::new());
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default());
    client.ensure_integration().await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = client.on("status_update", move |_| {
        tx.send(()).map_err(|e| ConvoyError::Internal(e.to_string()))
    });

    transport.inject_frame("this is not json").await;
    transport
        .inject_event("status_update", serde_json::json!({}))
        .await;

    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("pump should survive the malformed frame")
        .unwrap();
}

#[tokio::test]
async fn dispose_disconnects_the_transport() {
    let transport = Arc::new(MockTransport::new());
    let client = ChannelClient::new("user-1", transport.clone(), &ChannelConfig::default());
    client.ensure_integration().await.unwrap();
    assert!(transport.is_connected());

    client.dispose().await;
    assert!(!transport.is_connected());
}
