//! End-to-end delivery over TCP, ordering, backpressure and exhaustion.

use crate::support::{descriptor, node, node_with, wait_for_messages};
use async_trait::async_trait;
use maple_directory::config::DirectoryConfig;
use maple_directory::error::{ApiError, Exhaustion, Unavailability};
use maple_directory::transport::{ListenAddress, Message, SenderRef, Transport, TransportError};
use maple_directory::AgentDirectory;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn tester() -> SenderRef {
    SenderRef::External("tester".into())
}

/// Refuses every connection.
#[derive(Default)]
struct DeadTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for DeadTransport {
    async fn deliver(
        &self,
        addr: &ListenAddress,
        _message: &Message,
    ) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Connect {
            addr: addr.to_string(),
            detail: "connection refused".into(),
        })
    }
}

fn fast_retries() -> DirectoryConfig {
    let mut config = DirectoryConfig::ephemeral();
    config.router.max_attempts = 3;
    config.router.initial_backoff_ms = 10;
    config.router.max_backoff_ms = 40;
    config
}

#[tokio::test]
async fn test_logistics_bot_round_trip() {
    let node = node();
    let did = node.directory.create_agent("logistics-bot", "logistics").unwrap();
    node.directory
        .launch_agent(&did, descriptor("logistics-bot", "logistics").as_bytes())
        .await
        .unwrap();

    let receipt = node
        .directory
        .send_message(tester(), &did, "ping", json!({"n": 1}), None)
        .await
        .unwrap();
    assert_eq!(receipt.recipient, did);
    assert_eq!(receipt.attempts, 1);
    assert!(!receipt.message_id.is_empty());

    wait_for_messages(&node.recorder, 1).await;
    assert_eq!(node.recorder.actions(), vec!["ping"]);
    assert_eq!(node.recorder.payloads(), vec![json!({"n": 1})]);

    node.directory.terminate_agent(&did).await.unwrap();
    let err = node
        .directory
        .send_message(tester(), &did, "ping", json!({"n": 2}), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::RecipientUnavailable { reason: Unavailability::Terminated, .. }
    ));
    assert_eq!(node.directory.router_stats().delivered, 1);
    assert_eq!(node.directory.router_stats().unavailable, 1);
}

#[tokio::test]
async fn test_registered_only_agent_is_unavailable() {
    let node = node();
    let did = node.directory.create_agent("idle", "logistics").unwrap();
    let err = node
        .directory
        .send_message(tester(), &did, "ping", json!(null), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::RecipientUnavailable { reason: Unavailability::NotRunning { .. }, .. }
    ));

    let ghost = maple_directory::Did::generate();
    let err = node
        .directory
        .send_message(tester(), &ghost, "ping", json!(null), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::RecipientUnavailable { reason: Unavailability::Unknown, .. }
    ));
}

#[tokio::test]
async fn test_messages_arrive_in_send_order() {
    let node = node();
    let (did, _) = node
        .directory
        .spawn_agent(descriptor("bot", "logistics").as_bytes())
        .await
        .unwrap();

    for i in 0..20 {
        node.directory
            .send_message(tester(), &did, "step", json!(i), None)
            .await
            .unwrap();
    }

    wait_for_messages(&node.recorder, 20).await;
    let expected: Vec<_> = (0..20).map(|i| json!(i)).collect();
    assert_eq!(node.recorder.payloads(), expected);
    node.directory.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_full_inbox_exhausts_delivery() {
    let node = node_with(fast_retries());
    let bytes = "name: bot\nrole: logistics\nbehaviors: [record]\nresources:\n  max_inbox: 1\n";
    let (did, _) = node.directory.spawn_agent(bytes.as_bytes()).await.unwrap();

    // Occupy the dispatcher, then fill the single inbox slot
    node.directory
        .send_message(tester(), &did, "block", json!(null), None)
        .await
        .unwrap();
    wait_for_messages(&node.recorder, 1).await;
    node.directory
        .send_message(tester(), &did, "queued", json!(null), None)
        .await
        .unwrap();

    let err = node
        .directory
        .send_message(tester(), &did, "overflow", json!(null), None)
        .await
        .unwrap_err();
    let ApiError::DeliveryExhausted { attempts, reason, .. } = err else {
        panic!("expected exhaustion, got {:?}", err);
    };
    assert_eq!(attempts, 3);
    assert!(matches!(reason, Exhaustion::RetriesExhausted { .. }));

    node.recorder.release.notify_one();
    wait_for_messages(&node.recorder, 2).await;
    assert_eq!(node.recorder.actions(), vec!["block", "queued"]);
    node.directory.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dead_transport_fails_exactly_once() {
    let transport = Arc::new(DeadTransport::default());
    let directory = AgentDirectory::builder(fast_retries())
        .transport(transport.clone())
        .build()
        .unwrap();
    let (did, _) = directory
        .spawn_agent(b"name: bot\nrole: logistics\nbehaviors: [noop]\n")
        .await
        .unwrap();

    let err = directory
        .send_message(tester(), &did, "ping", json!(null), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::DeliveryExhausted { attempts: 3, reason: Exhaustion::RetriesExhausted { .. }, .. }
    ));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);

    let stats = directory.router_stats();
    assert_eq!(stats.exhausted, 1);
    assert_eq!(stats.delivered, 0);
    directory.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_deadline_cuts_retries_short() {
    let mut config = DirectoryConfig::ephemeral();
    config.router.max_attempts = 10;
    config.router.initial_backoff_ms = 1_000;
    config.router.max_backoff_ms = 5_000;
    let directory = AgentDirectory::builder(config)
        .transport(Arc::new(DeadTransport::default()))
        .build()
        .unwrap();
    let (did, _) = directory
        .spawn_agent(b"name: bot\nrole: logistics\nbehaviors: [noop]\n")
        .await
        .unwrap();

    let started = Instant::now();
    let err = directory
        .send_message(
            tester(),
            &did,
            "ping",
            json!(null),
            Some(started + Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::DeliveryExhausted { reason: Exhaustion::Deadline, .. }
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
    directory.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_action_rejected() {
    let node = node();
    let (did, _) = node
        .directory
        .spawn_agent(descriptor("bot", "logistics").as_bytes())
        .await
        .unwrap();
    let err = node
        .directory
        .send_message(tester(), &did, "  ", json!(null), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
    node.directory.shutdown().await.unwrap();
}
