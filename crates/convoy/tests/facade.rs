// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Smoke test of the full stack through the facade re-exports.

use std::sync::{Arc, Mutex};

use convoy::{
    ComponentFactory, ConvoyConfig, ConvoyError, MemoryStore, MessageStatus, Transport,
    TransportFactory,
};
use convoy_test_utils::MockTransport;

struct SingleMock(Arc<MockTransport>);

impl TransportFactory for SingleMock {
    fn transport_for(&self, _user_id: &str) -> Result<Arc<dyn Transport>, ConvoyError> {
        Ok(self.0.clone())
    }
}

#[tokio::test(start_paused = true)]
async fn a_message_travels_the_whole_stack() {
    let transport = Arc::new(MockTransport::new());
    let factory = ComponentFactory::new(
        ConvoyConfig::default(),
        Arc::new(SingleMock(transport.clone())),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
    );

    let conversation = factory.conversation_manager("alice").await.unwrap();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let seen = statuses.clone();
    let message = conversation.send_message("hello out there").await;
    let id = message.id.clone();
    conversation.observe(move |state| {
        if let Some(m) = state.messages.iter().find(|m| m.id == id) {
            seen.lock().unwrap().push(m.status);
        }
        Ok(())
    });

    conversation.process_queue().await;

    let frames = transport.sent_frames().await;
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains("hello out there"));

    let state = conversation.state().await;
    assert_eq!(state.messages[0].status, MessageStatus::Sent);
    assert!(statuses.lock().unwrap().contains(&MessageStatus::Sent));

    factory.shutdown().await;
    assert!(!transport.is_connected());
}
