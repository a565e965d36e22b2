//! Spawn, launch, terminate and fault handling against real TCP listeners.

use crate::support::{descriptor, node, node_with, wait_for_messages, wait_for_state};
use maple_directory::config::DirectoryConfig;
use maple_directory::error::ApiError;
use maple_directory::transport::SenderRef;
use maple_directory::types::AgentState;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_spawn_reaches_running() {
    let node = node();
    let (did, addr) = node
        .directory
        .spawn_agent(descriptor("bot", "logistics").as_bytes())
        .await
        .unwrap();

    let record = node.directory.resolve(&did).unwrap();
    assert_eq!(record.state, AgentState::Running);
    assert_eq!(record.listen_addr, Some(addr.clone()));
    assert!(!addr.is_ephemeral());

    // The listener is live
    let stream = tokio::net::TcpStream::connect(addr.socket_target()).await;
    assert!(stream.is_ok());

    node.directory.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_spawn_without_role_issues_nothing() {
    let node = node();
    let err = node
        .directory
        .spawn_agent(b"name: bot\nbehaviors: [record]\n")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::SchemaViolation { ref field, .. } if field == "role"));
    assert!(node.directory.list_agents(None).is_empty());
}

#[tokio::test]
async fn test_spawn_from_file() {
    let node = node();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("bot.map");
    std::fs::write(&path, descriptor("filebot", "logistics")).unwrap();

    let (did, _) = node.directory.spawn_agent_file(&path).await.unwrap();
    assert_eq!(node.directory.resolve(&did).unwrap().name, "filebot");
    node.directory.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spawns_are_distinct() {
    let node = Arc::new(node());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let node = node.clone();
            tokio::spawn(async move {
                node.directory
                    .spawn_agent(descriptor(&format!("bot-{}", i), "logistics").as_bytes())
                    .await
            })
        })
        .collect();

    let mut dids = HashSet::new();
    let mut addrs = HashSet::new();
    for handle in handles {
        let (did, addr) = handle.await.unwrap().unwrap();
        dids.insert(did);
        addrs.insert(addr);
    }
    assert_eq!(dids.len(), 8);
    assert_eq!(addrs.len(), 8);

    assert_eq!(node.directory.shutdown().await.unwrap(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_launch_same_did() {
    let node = Arc::new(node());
    let did = node.directory.create_agent("bot", "logistics").unwrap();
    let bytes = descriptor("bot", "logistics");

    let attempts: Vec<_> = (0..2)
        .map(|_| {
            let (node, did, bytes) = (node.clone(), did.clone(), bytes.clone());
            tokio::spawn(async move { node.directory.launch_agent(&did, bytes.as_bytes()).await })
        })
        .collect();

    let mut ok = 0;
    let mut already = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ApiError::AlreadyRunning(d)) => {
                assert_eq!(d, did);
                already += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!((ok, already), (1, 1));
    node.directory.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_terminate_archives_record() {
    let node = node();
    let (did, addr) = node
        .directory
        .spawn_agent(descriptor("bot", "logistics").as_bytes())
        .await
        .unwrap();

    let report = node.directory.terminate_agent(&did).await.unwrap();
    assert_eq!(report.did, did);
    assert!(!report.forced);

    let record = node.directory.resolve(&did).unwrap();
    assert_eq!(record.state, AgentState::Terminated);
    assert_eq!(record.listen_addr, None);

    // Listener released
    assert!(tokio::net::TcpStream::connect(addr.socket_target()).await.is_err());

    // Terminal DIDs cannot be relaunched
    let err = node
        .directory
        .launch_agent(&did, descriptor("bot", "logistics").as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_unknown_behavior_fails_agent() {
    let node = node();
    let err = node
        .directory
        .spawn_agent(b"name: bot\nrole: logistics\nbehaviors: [teleport]\n")
        .await
        .unwrap_err();
    let ApiError::SpawnFailed { did, cause } = err else {
        panic!("expected spawn failure, got {:?}", err);
    };
    assert!(cause.contains("teleport"));
    assert_eq!(node.directory.resolve(&did).unwrap().state, AgentState::Failed);
}

#[tokio::test]
async fn test_panicking_behavior_faults_agent() {
    let node = node();
    let (did, _) = node
        .directory
        .spawn_agent(descriptor("bot", "logistics").as_bytes())
        .await
        .unwrap();

    node.directory
        .send_message(
            SenderRef::External("tester".into()),
            &did,
            "crash",
            serde_json::Value::Null,
            None,
        )
        .await
        .unwrap();

    wait_for_state(&node.directory, &did, AgentState::Failed)
        .await
        .unwrap();
    let record = node.directory.resolve(&did).unwrap();
    assert!(record.failure.unwrap().contains("panicked"));
    assert_eq!(record.listen_addr, None);

    // Nothing left to stop
    assert_eq!(node.directory.shutdown().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stuck_context_is_aborted_after_grace() {
    let mut config = DirectoryConfig::ephemeral();
    config.supervisor.grace_period_ms = 100;
    let node = node_with(config);
    let (did, _) = node
        .directory
        .spawn_agent(descriptor("bot", "logistics").as_bytes())
        .await
        .unwrap();

    node.directory
        .send_message(
            SenderRef::External("tester".into()),
            &did,
            "stall",
            serde_json::Value::Null,
            None,
        )
        .await
        .unwrap();
    wait_for_messages(&node.recorder, 1).await;

    let started = Instant::now();
    let report = node.directory.terminate_agent(&did).await.unwrap();
    assert!(report.forced);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert_eq!(
        node.directory.resolve(&did).unwrap().state,
        AgentState::Terminated
    );
}
