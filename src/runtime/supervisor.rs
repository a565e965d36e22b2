//! Agent runtime supervisor: launch, terminate, and fault monitoring.

use super::behavior::{BehaviorCatalog, BehaviorContext};
use super::context::{self, AgentProgram};
use crate::concurrency::KeyedLocks;
use crate::descriptor::{AgentSpecification, ListenSpec};
use crate::error::ApiError;
use crate::identity::IdentityRegistry;
use crate::router::MessageRouter;
use crate::transport::ListenAddress;
use crate::types::{AgentState, Did};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// How long a cancelled context may take to wind down before it is aborted.
    pub grace_period: Duration,
    /// How long a new context has to signal ready.
    pub startup_timeout: Duration,
    /// Bind address for descriptors with `listen: auto`.
    pub default_listen: ListenAddress,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            startup_timeout: Duration::from_secs(5),
            default_listen: ListenAddress::new(
                crate::transport::Host::Ip4(std::net::Ipv4Addr::LOCALHOST),
                0,
            ),
        }
    }
}

/// Outcome of `terminate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationReport {
    pub did: Did,
    /// True when the context ignored cancellation past the grace period and was aborted.
    pub forced: bool,
    pub terminated_at: DateTime<Utc>,
}

struct ExecutionHandle {
    generation: u64,
    cancel: CancellationToken,
    join: JoinHandle<()>,
    addr: ListenAddress,
}

/// Unrequested exit of an execution context.
struct Fault {
    did: Did,
    generation: u64,
    cause: String,
}

/// Owns every live execution context.
///
/// Per-DID operations are serialized with keyed async locks, so a DID has at
/// most one live context. Unrequested exits are reported to a monitor task
/// that marks the agent failed.
pub struct AgentSupervisor {
    registry: Arc<IdentityRegistry>,
    router: Arc<MessageRouter>,
    behaviors: Arc<BehaviorCatalog>,
    contexts: Arc<DashMap<Did, ExecutionHandle>>,
    locks: KeyedLocks<Did>,
    config: SupervisorConfig,
    faults: mpsc::UnboundedSender<Fault>,
    generations: AtomicU64,
}

impl AgentSupervisor {
    /// Create a supervisor and start its fault monitor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        registry: Arc<IdentityRegistry>,
        router: Arc<MessageRouter>,
        behaviors: Arc<BehaviorCatalog>,
        config: SupervisorConfig,
    ) -> Self {
        let (faults, fault_rx) = mpsc::unbounded_channel();
        let contexts = Arc::new(DashMap::new());
        let locks = KeyedLocks::new();

        tokio::spawn(monitor(
            fault_rx,
            registry.clone(),
            router.clone(),
            contexts.clone(),
            locks.clone(),
        ));

        Self {
            registry,
            router,
            behaviors,
            contexts,
            locks,
            config,
            faults,
            generations: AtomicU64::new(0),
        }
    }

    pub fn behaviors(&self) -> &Arc<BehaviorCatalog> {
        &self.behaviors
    }

    /// Register a new identity from the descriptor and launch it.
    pub async fn spawn(
        &self,
        spec: &AgentSpecification,
    ) -> Result<(Did, ListenAddress), ApiError> {
        spec.resources.validate()?;
        let record = self.registry.issue(&spec.name, &spec.role)?;
        let addr = self.launch(&record.did, spec).await?;
        Ok((record.did, addr))
    }

    /// Start an execution context for an already registered DID.
    pub async fn launch(
        &self,
        did: &Did,
        spec: &AgentSpecification,
    ) -> Result<ListenAddress, ApiError> {
        spec.resources.validate()?;
        let result = {
            let _guard = self.locks.lock(did).await;
            self.launch_locked(did, spec).await
        };
        self.locks.release(did);
        result
    }

    async fn launch_locked(
        &self,
        did: &Did,
        spec: &AgentSpecification,
    ) -> Result<ListenAddress, ApiError> {
        let record = self.registry.resolve(did)?;
        if self.contexts.contains_key(did)
            || matches!(
                record.state,
                AgentState::Starting | AgentState::Running | AgentState::Stopping
            )
        {
            return Err(ApiError::AlreadyRunning(did.clone()));
        }
        if record.state.is_terminal() {
            return Err(ApiError::InvalidTransition {
                did: did.clone(),
                from: record.state,
                to: AgentState::Starting,
            });
        }
        if record.name != spec.name || record.role != spec.role {
            debug!(
                did = %did,
                record_name = %record.name,
                descriptor_name = %spec.name,
                "Descriptor identity differs from record; record wins"
            );
        }

        self.registry.update_state(did, AgentState::Starting)?;

        let program = AgentProgram {
            context: BehaviorContext {
                did: did.clone(),
                name: record.name.clone(),
                role: record.role.clone(),
                config: Arc::new(spec.config.clone()),
            },
            behaviors: Vec::new(),
            limits: spec.resources,
        };

        let handle = match self.start_context(spec, program).await {
            Ok(handle) => handle,
            Err(cause) => return Err(self.start_failed(did, cause)),
        };

        let addr = handle.addr.clone();
        if let Err(e) = self.registry.mark_running(did, addr.clone()) {
            handle.cancel.cancel();
            handle.join.abort();
            let cause = format!("could not record running state: {}", e);
            return Err(self.start_failed(did, cause));
        }
        self.router.register(did.clone(), addr.clone());
        self.contexts.insert(did.clone(), handle);

        info!(did = %did, addr = %addr, "Agent running");
        Ok(addr)
    }

    fn start_failed(&self, did: &Did, cause: String) -> ApiError {
        warn!(did = %did, cause = %cause, "Agent failed to start");
        if let Err(e) = self.registry.mark_failed(did, &cause) {
            error!(did = %did, error = %e, "Could not record start failure");
        }
        ApiError::SpawnFailed {
            did: did.clone(),
            cause,
        }
    }

    async fn start_context(
        &self,
        spec: &AgentSpecification,
        mut program: AgentProgram,
    ) -> Result<ExecutionHandle, String> {
        program.behaviors = self.behaviors.resolve(&spec.behaviors)?;

        let requested = match &spec.listen {
            ListenSpec::Auto => self.config.default_listen.clone(),
            ListenSpec::Fixed(addr) => addr.clone(),
        };
        let listener = TcpListener::bind(requested.socket_target())
            .await
            .map_err(|e| format!("bind {} failed: {}", requested, e))?;
        let local = listener
            .local_addr()
            .map_err(|e| format!("bind {} failed: {}", requested, e))?;
        let addr = requested.with_port(local.port());

        let did = program.context.did.clone();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        let token = cancel.clone();
        let faults = self.faults.clone();
        let join = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(context::run(listener, program, ready_tx, token.clone()))
                .catch_unwind()
                .await;
            if token.is_cancelled() {
                return;
            }
            let cause = match outcome {
                Ok(Ok(())) => "execution context exited".to_string(),
                Ok(Err(e)) => e,
                Err(panic) => format!("execution context panicked: {}", panic_message(&*panic)),
            };
            let _ = faults.send(Fault {
                did,
                generation,
                cause,
            });
        });

        let startup_ms = self.config.startup_timeout.as_millis();
        let failure = match timeout(self.config.startup_timeout, ready_rx).await {
            Ok(Ok(())) => None,
            Ok(Err(_)) => Some("execution context exited before signalling ready".to_string()),
            Err(_) => Some(format!("no ready signal within {} ms", startup_ms)),
        };
        if let Some(cause) = failure {
            cancel.cancel();
            join.abort();
            return Err(cause);
        }

        Ok(ExecutionHandle {
            generation,
            cancel,
            join,
            addr,
        })
    }

    /// Stop a running agent and archive its record as `terminated`.
    pub async fn terminate(&self, did: &Did) -> Result<TerminationReport, ApiError> {
        let result = {
            let _guard = self.locks.lock(did).await;
            self.terminate_locked(did).await
        };
        self.locks.release(did);
        result
    }

    async fn terminate_locked(&self, did: &Did) -> Result<TerminationReport, ApiError> {
        let record = self.registry.resolve(did)?;
        if record.state != AgentState::Running {
            return Err(ApiError::InvalidTransition {
                did: did.clone(),
                from: record.state,
                to: AgentState::Stopping,
            });
        }

        self.registry.update_state(did, AgentState::Stopping)?;
        self.router.deregister(did);

        let forced = match self.contexts.remove(did) {
            Some((_, handle)) => self.stop_context(did, handle).await,
            None => false,
        };

        let record = self.registry.update_state(did, AgentState::Terminated)?;
        info!(did = %did, forced, "Agent terminated");
        Ok(TerminationReport {
            did: did.clone(),
            forced,
            terminated_at: record.updated_at,
        })
    }

    async fn stop_context(&self, did: &Did, handle: ExecutionHandle) -> bool {
        handle.cancel.cancel();
        let mut join = handle.join;
        match timeout(self.config.grace_period, &mut join).await {
            Ok(_) => false,
            Err(_) => {
                warn!(
                    did = %did,
                    grace_ms = self.config.grace_period.as_millis() as u64,
                    "Execution context ignored cancellation; aborting"
                );
                // The task may still be inside blocking code; do not wait on it.
                join.abort();
                true
            }
        }
    }

    /// Terminate every live context. Returns how many were stopped.
    pub async fn shutdown_all(&self) -> usize {
        let dids: Vec<Did> = self.contexts.iter().map(|e| e.key().clone()).collect();
        let results =
            futures::future::join_all(dids.iter().map(|did| self.terminate(did))).await;

        let mut stopped = 0;
        for (did, result) in dids.iter().zip(results) {
            match result {
                Ok(_) => stopped += 1,
                Err(e) => warn!(did = %did, error = %e, "Failed to terminate agent during shutdown"),
            }
        }
        info!(stopped, "Supervisor shut down");
        stopped
    }

    pub fn is_live(&self, did: &Did) -> bool {
        self.contexts.contains_key(did)
    }

    pub fn live_count(&self) -> usize {
        self.contexts.len()
    }
}

async fn monitor(
    mut faults: mpsc::UnboundedReceiver<Fault>,
    registry: Arc<IdentityRegistry>,
    router: Arc<MessageRouter>,
    contexts: Arc<DashMap<Did, ExecutionHandle>>,
    locks: KeyedLocks<Did>,
) {
    while let Some(fault) = faults.recv().await {
        {
            let _guard = locks.lock(&fault.did).await;
            record_fault(&fault, &registry, &router, &contexts);
        }
        locks.release(&fault.did);
    }
}

fn record_fault(
    fault: &Fault,
    registry: &IdentityRegistry,
    router: &MessageRouter,
    contexts: &DashMap<Did, ExecutionHandle>,
) {
    // A fault from a context that was already replaced or stopped is stale.
    let removed = contexts.remove_if(&fault.did, |_, handle| handle.generation == fault.generation);
    if removed.is_none() {
        debug!(did = %fault.did, "Ignoring fault from retired context");
        return;
    }

    router.deregister(&fault.did);
    match registry.mark_failed(&fault.did, &fault.cause) {
        Ok(_) => error!(did = %fault.did, cause = %fault.cause, "Agent faulted"),
        Err(e) => warn!(did = %fault.did, error = %e, "Could not record agent fault"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
