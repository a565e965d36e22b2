//! Shared fixtures.

use async_trait::async_trait;
use maple_directory::config::DirectoryConfig;
use maple_directory::error::ApiError;
use maple_directory::runtime::{Behavior, BehaviorCatalog, BehaviorContext};
use maple_directory::transport::Message;
use maple_directory::types::{AgentState, Did};
use maple_directory::AgentDirectory;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Records every message; `crash` panics, `block` waits until released,
/// `stall` blocks its worker thread for 1.5 s.
#[derive(Default)]
pub struct RecordingBehavior {
    pub seen: Mutex<Vec<Message>>,
    pub release: Notify,
}

impl RecordingBehavior {
    pub fn actions(&self) -> Vec<String> {
        self.seen.lock().iter().map(|m| m.action.clone()).collect()
    }

    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.seen.lock().iter().map(|m| m.payload.clone()).collect()
    }
}

#[async_trait]
impl Behavior for RecordingBehavior {
    fn name(&self) -> &str {
        "record"
    }

    fn handles(&self, _action: &str) -> bool {
        true
    }

    async fn handle(&self, _ctx: &BehaviorContext, message: &Message) -> Result<(), String> {
        self.seen.lock().push(message.clone());
        match message.action.as_str() {
            "crash" => panic!("behavior crashed on request"),
            "block" => {
                self.release.notified().await;
                Ok(())
            }
            "stall" => {
                std::thread::sleep(Duration::from_millis(1500));
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

pub struct Node {
    pub directory: AgentDirectory,
    pub recorder: Arc<RecordingBehavior>,
}

pub fn node() -> Node {
    node_with(DirectoryConfig::ephemeral())
}

pub fn node_with(config: DirectoryConfig) -> Node {
    let recorder = Arc::new(RecordingBehavior::default());
    let catalog = Arc::new(BehaviorCatalog::with_builtins());
    catalog.register(recorder.clone());
    let directory = AgentDirectory::builder(config)
        .behaviors(catalog)
        .build()
        .unwrap();
    Node {
        directory,
        recorder,
    }
}

pub fn descriptor(name: &str, role: &str) -> String {
    format!("name: {name}\nrole: {role}\nbehaviors: [record]\n")
}

/// Poll until the record reaches `state` or two seconds pass.
pub async fn wait_for_state(
    directory: &AgentDirectory,
    did: &Did,
    state: AgentState,
) -> Result<(), ApiError> {
    for _ in 0..100 {
        if directory.resolve(did)?.state == state {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "{} never reached {}, still {}",
        did,
        state,
        directory.resolve(did)?.state
    );
}

/// Poll until the recorder has seen `count` messages.
pub async fn wait_for_messages(recorder: &RecordingBehavior, count: usize) {
    for _ in 0..100 {
        if recorder.seen.lock().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {} messages, saw {}",
        count,
        recorder.seen.lock().len()
    );
}
