//! Message Router
//!
//! Resolves a recipient DID to its registered listen address and delivers
//! with at-least-once semantics: transient transport failures are retried
//! with exponential backoff, and every failed send ends in exactly one typed
//! error.

pub mod policy;

pub use policy::RouterConfig;

use crate::concurrency::KeyedLocks;
use crate::error::{ApiError, Exhaustion, Unavailability};
use crate::identity::IdentityRegistry;
use crate::transport::{ListenAddress, Message, SenderRef, Transport};
use crate::types::{AgentState, Did};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Ordering locks kept before idle entries are pruned.
const ORDERING_PRUNE_THRESHOLD: usize = 1024;

/// A message to route.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub sender: SenderRef,
    pub recipient: Did,
    pub action: String,
    pub payload: serde_json::Value,
    /// Bounds the whole send: ordering wait, attempts and backoff.
    pub deadline: Option<Instant>,
}

impl SendRequest {
    pub fn new(
        sender: SenderRef,
        recipient: Did,
        action: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            sender,
            recipient,
            action: action.into(),
            payload,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Proof that the recipient's transport accepted a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub recipient: Did,
    pub attempts: u32,
    pub accepted_at: DateTime<Utc>,
}

/// Outcome counters since the router started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    pub delivered: u64,
    pub exhausted: u64,
    pub unavailable: u64,
}

pub struct MessageRouter {
    registry: Arc<IdentityRegistry>,
    addresses: DashMap<Did, ListenAddress>,
    transport: Arc<dyn Transport>,
    ordering: KeyedLocks<(SenderRef, Did)>,
    config: RouterConfig,
    stats: RwLock<RouterStats>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        transport: Arc<dyn Transport>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            addresses: DashMap::new(),
            transport,
            ordering: KeyedLocks::new(),
            config,
            stats: RwLock::new(RouterStats::default()),
        }
    }

    /// Record where a running agent listens.
    pub fn register(&self, did: Did, addr: ListenAddress) {
        debug!(did = %did, addr = %addr, "Registered agent address");
        self.addresses.insert(did, addr);
    }

    pub fn deregister(&self, did: &Did) -> Option<ListenAddress> {
        let removed = self.addresses.remove(did).map(|(_, addr)| addr);
        if removed.is_some() {
            debug!(did = %did, "Deregistered agent address");
        }
        removed
    }

    pub fn address_of(&self, did: &Did) -> Option<ListenAddress> {
        self.addresses.get(did).map(|entry| entry.value().clone())
    }

    pub fn stats(&self) -> RouterStats {
        self.stats.read().clone()
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Deliver a message, returning a receipt once the recipient accepts it.
    pub async fn send(&self, request: SendRequest) -> Result<DeliveryReceipt, ApiError> {
        if request.action.trim().is_empty() {
            return Err(ApiError::InvalidRequest("action must not be empty".into()));
        }

        let recipient = request.recipient.clone();
        let attempts = AtomicU32::new(0);
        let outcome = match self.available_address(&recipient) {
            Err(e) => Err(e),
            Ok(_) => match request.deadline {
                Some(deadline) => match timeout_at(deadline, self.deliver(&request, &attempts)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(ApiError::DeliveryExhausted {
                        did: recipient.clone(),
                        attempts: attempts.load(Ordering::SeqCst),
                        reason: Exhaustion::Deadline,
                    }),
                },
                None => self.deliver(&request, &attempts).await,
            },
        };

        if self.ordering.len() > ORDERING_PRUNE_THRESHOLD {
            self.ordering.prune();
        }

        let mut stats = self.stats.write();
        match &outcome {
            Ok(_) => stats.delivered += 1,
            Err(ApiError::RecipientUnavailable { .. }) => stats.unavailable += 1,
            Err(ApiError::DeliveryExhausted { did, attempts, reason }) => {
                stats.exhausted += 1;
                warn!(
                    did = %did,
                    attempts = *attempts,
                    reason = %reason,
                    "Delivery exhausted"
                );
            }
            Err(_) => {}
        }
        outcome
    }

    async fn deliver(
        &self,
        request: &SendRequest,
        attempts: &AtomicU32,
    ) -> Result<DeliveryReceipt, ApiError> {
        let key = (request.sender.clone(), request.recipient.clone());
        let _ordering = self.ordering.lock(&key).await;

        let mut message = Message::new(
            request.sender.clone(),
            request.recipient.clone(),
            request.action.clone(),
            request.payload.clone(),
        );
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            // The recipient may have stopped while we were waiting or backing off.
            let addr = self.available_address(&request.recipient)?;
            attempts.store(attempt, Ordering::SeqCst);
            message.attempts = attempt;

            match self.transport.deliver(&addr, &message).await {
                Ok(message_id) => {
                    info!(
                        did = %request.recipient,
                        sender = %request.sender,
                        action = %request.action,
                        message_id = %message_id,
                        attempt,
                        "Message delivered"
                    );
                    return Ok(DeliveryReceipt {
                        message_id,
                        recipient: request.recipient.clone(),
                        attempts: attempt,
                        accepted_at: Utc::now(),
                    });
                }
                Err(e) if !e.is_transient() => {
                    return Err(ApiError::DeliveryExhausted {
                        did: request.recipient.clone(),
                        attempts: attempt,
                        reason: Exhaustion::Rejected {
                            detail: e.to_string(),
                        },
                    });
                }
                Err(e) => {
                    debug!(
                        did = %request.recipient,
                        attempt,
                        error = %e,
                        "Delivery attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < self.config.max_attempts {
                        sleep(self.config.backoff_for(attempt)).await;
                    }
                }
            }
        }

        Err(ApiError::DeliveryExhausted {
            did: request.recipient.clone(),
            attempts: self.config.max_attempts,
            reason: Exhaustion::RetriesExhausted { last_error },
        })
    }

    fn available_address(&self, did: &Did) -> Result<ListenAddress, ApiError> {
        let unavailable = |reason| ApiError::RecipientUnavailable {
            did: did.clone(),
            reason,
        };

        let record = match self.registry.resolve(did) {
            Ok(record) => record,
            Err(ApiError::UnknownIdentity(_)) => return Err(unavailable(Unavailability::Unknown)),
            Err(e) => return Err(e),
        };

        match record.state {
            AgentState::Running => self
                .address_of(did)
                .ok_or_else(|| unavailable(Unavailability::NotRunning { state: record.state })),
            AgentState::Terminated => Err(unavailable(Unavailability::Terminated)),
            AgentState::Failed => Err(unavailable(Unavailability::Failed)),
            state => Err(unavailable(Unavailability::NotRunning { state })),
        }
    }
}
