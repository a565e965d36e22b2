//! Executable behaviors and the catalog descriptors reference them from.

use crate::transport::Message;
use crate::types::Did;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What a behavior knows about the agent it runs in.
#[derive(Debug, Clone)]
pub struct BehaviorContext {
    pub did: Did,
    pub name: String,
    pub role: String,
    /// Descriptor `config` mapping.
    pub config: Arc<Map<String, Value>>,
}

/// Unit of agent logic.
///
/// The execution context hands each accepted message to the first behavior
/// (in descriptor order) whose `handles` returns true.
#[async_trait]
pub trait Behavior: Send + Sync {
    fn name(&self) -> &str;

    fn handles(&self, action: &str) -> bool;

    /// An `Err` is logged and the agent keeps running; a panic faults the agent.
    async fn handle(&self, ctx: &BehaviorContext, message: &Message) -> Result<(), String>;
}

/// Traces every message it sees.
pub struct LogBehavior;

#[async_trait]
impl Behavior for LogBehavior {
    fn name(&self) -> &str {
        "log"
    }

    fn handles(&self, _action: &str) -> bool {
        true
    }

    async fn handle(&self, ctx: &BehaviorContext, message: &Message) -> Result<(), String> {
        info!(
            did = %ctx.did,
            sender = %message.sender,
            action = %message.action,
            message_id = %message.id,
            "Agent received message"
        );
        Ok(())
    }
}

/// Accepts and discards everything.
pub struct NoopBehavior;

#[async_trait]
impl Behavior for NoopBehavior {
    fn name(&self) -> &str {
        "noop"
    }

    fn handles(&self, _action: &str) -> bool {
        true
    }

    async fn handle(&self, _ctx: &BehaviorContext, _message: &Message) -> Result<(), String> {
        Ok(())
    }
}

/// Name -> behavior lookup used when launching agents.
pub struct BehaviorCatalog {
    behaviors: RwLock<HashMap<String, Arc<dyn Behavior>>>,
}

impl BehaviorCatalog {
    /// Empty catalog.
    pub fn empty() -> Self {
        Self {
            behaviors: RwLock::new(HashMap::new()),
        }
    }

    /// Catalog preloaded with `log` and `noop`.
    pub fn with_builtins() -> Self {
        let catalog = Self::empty();
        catalog.register(Arc::new(LogBehavior));
        catalog.register(Arc::new(NoopBehavior));
        catalog
    }

    /// Add or replace a behavior under its own name.
    pub fn register(&self, behavior: Arc<dyn Behavior>) {
        let name = behavior.name().to_string();
        debug!(behavior = %name, "Registered behavior");
        self.behaviors.write().insert(name, behavior);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Behavior>> {
        self.behaviors.read().get(name).cloned()
    }

    /// Resolve descriptor references in order, failing on the first unknown name.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Behavior>>, String> {
        let behaviors = self.behaviors.read();
        names
            .iter()
            .map(|name| {
                behaviors
                    .get(name)
                    .cloned()
                    .ok_or_else(|| format!("unknown behavior '{}'", name))
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.behaviors.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BehaviorCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}
