//! Identity issuance, uniqueness policy and restart recovery through the directory.

use crate::support::{descriptor, node, node_with};
use maple_directory::config::DirectoryConfig;
use maple_directory::error::ApiError;
use maple_directory::identity::{InMemoryIdentityRepository, NameUniqueness};
use maple_directory::types::{AgentState, DID_PREFIX};
use maple_directory::AgentDirectory;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_create_then_resolve() {
    let node = node();
    let did = node
        .directory
        .create_agent("logistics-bot", "logistics")
        .unwrap();
    assert!(did.as_str().starts_with(DID_PREFIX));

    let record = node.directory.resolve(&did).unwrap();
    assert_eq!(record.name, "logistics-bot");
    assert_eq!(record.role, "logistics");
    assert_eq!(record.state, AgentState::Registered);
}

#[tokio::test]
async fn test_reregistration_gets_new_did() {
    let node = node();
    let dids: HashSet<_> = (0..10)
        .map(|_| node.directory.create_agent("bot", "logistics").unwrap())
        .collect();
    assert_eq!(dids.len(), 10);
    assert_eq!(node.directory.list_agents(Some("logistics")).len(), 10);
}

#[tokio::test]
async fn test_per_role_uniqueness_until_terminated() {
    let mut config = DirectoryConfig::ephemeral();
    config.registry.name_uniqueness = NameUniqueness::PerRole;
    let node = node_with(config);

    let (did, _) = node
        .directory
        .spawn_agent(descriptor("bot", "logistics").as_bytes())
        .await
        .unwrap();
    assert!(matches!(
        node.directory.create_agent("bot", "logistics"),
        Err(ApiError::DuplicateNameConflict { existing, .. }) if existing == did
    ));

    node.directory.terminate_agent(&did).await.unwrap();
    let again = node.directory.create_agent("bot", "logistics").unwrap();
    assert_ne!(again, did);
}

#[tokio::test]
async fn test_restart_fails_orphaned_agents() {
    let repository = Arc::new(InMemoryIdentityRepository::new());

    let first = AgentDirectory::builder(DirectoryConfig::ephemeral())
        .repository(repository.clone())
        .build()
        .unwrap();
    let (running, _) = first
        .spawn_agent(b"name: a\nrole: r\nbehaviors: [noop]\n")
        .await
        .unwrap();
    let idle = first.create_agent("b", "r").unwrap();

    // A second node over the same store, as after a crash
    let second = AgentDirectory::builder(DirectoryConfig::ephemeral())
        .repository(repository)
        .build()
        .unwrap();
    let record = second.resolve(&running).unwrap();
    assert_eq!(record.state, AgentState::Failed);
    assert_eq!(record.failure.as_deref(), Some("orphaned by restart"));
    assert_eq!(second.resolve(&idle).unwrap().state, AgentState::Registered);

    first.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_did() {
    let node = node();
    let missing = maple_directory::Did::generate();
    assert!(matches!(
        node.directory.resolve(&missing),
        Err(ApiError::UnknownIdentity(d)) if d == missing
    ));
}
