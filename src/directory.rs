//! Agent directory: the native surface over registry, supervisor and router.

use crate::config::DirectoryConfig;
use crate::descriptor::{AgentSpecification, DescriptorLoader};
use crate::error::ApiError;
use crate::identity::{
    AgentRecord, IdentityRegistry, IdentityRepository, InMemoryIdentityRepository,
    SledIdentityRepository,
};
use crate::router::{DeliveryReceipt, MessageRouter, RouterStats, SendRequest};
use crate::runtime::{AgentSupervisor, BehaviorCatalog, TerminationReport};
use crate::transport::{ListenAddress, SenderRef, TcpTransport, Transport};
use crate::types::Did;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// One directory node.
///
/// Owns the identity registry, the runtime supervisor and the message router
/// and wires them together.
pub struct AgentDirectory {
    registry: Arc<IdentityRegistry>,
    router: Arc<MessageRouter>,
    supervisor: AgentSupervisor,
    loader: DescriptorLoader,
}

impl AgentDirectory {
    /// Open a node from configuration with the TCP transport and built-in behaviors.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &DirectoryConfig) -> Result<Self, ApiError> {
        DirectoryBuilder::new(config.clone()).build()
    }

    pub fn builder(config: DirectoryConfig) -> DirectoryBuilder {
        DirectoryBuilder::new(config)
    }

    /// Register an identity without starting it.
    pub fn create_agent(&self, name: &str, role: &str) -> Result<Did, ApiError> {
        Ok(self.registry.issue(name, role)?.did)
    }

    /// Validate a descriptor without touching the registry.
    pub fn load_descriptor(&self, bytes: &[u8]) -> Result<AgentSpecification, ApiError> {
        self.loader.load(bytes)
    }

    /// Register and start an agent from descriptor bytes.
    pub async fn spawn_agent(&self, bytes: &[u8]) -> Result<(Did, ListenAddress), ApiError> {
        let spec = self.loader.load(bytes)?;
        self.spawn_specification(&spec).await
    }

    pub async fn spawn_agent_file(&self, path: &Path) -> Result<(Did, ListenAddress), ApiError> {
        let spec = self.loader.load_file(path)?;
        self.spawn_specification(&spec).await
    }

    pub async fn spawn_specification(
        &self,
        spec: &AgentSpecification,
    ) -> Result<(Did, ListenAddress), ApiError> {
        self.supervisor.spawn(spec).await
    }

    /// Start a previously registered DID with the given descriptor.
    pub async fn launch_agent(&self, did: &Did, bytes: &[u8]) -> Result<ListenAddress, ApiError> {
        let spec = self.loader.load(bytes)?;
        self.supervisor.launch(did, &spec).await
    }

    pub async fn launch_specification(
        &self,
        did: &Did,
        spec: &AgentSpecification,
    ) -> Result<ListenAddress, ApiError> {
        self.supervisor.launch(did, spec).await
    }

    pub async fn send_message(
        &self,
        sender: SenderRef,
        did: &Did,
        action: &str,
        payload: serde_json::Value,
        deadline: Option<Instant>,
    ) -> Result<DeliveryReceipt, ApiError> {
        let mut request = SendRequest::new(sender, did.clone(), action, payload);
        request.deadline = deadline;
        self.router.send(request).await
    }

    pub async fn terminate_agent(&self, did: &Did) -> Result<TerminationReport, ApiError> {
        self.supervisor.terminate(did).await
    }

    pub fn resolve(&self, did: &Did) -> Result<AgentRecord, ApiError> {
        self.registry.resolve(did)
    }

    pub fn list_agents(&self, role: Option<&str>) -> Vec<AgentRecord> {
        self.registry.list(role)
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    pub fn behaviors(&self) -> &Arc<BehaviorCatalog> {
        self.supervisor.behaviors()
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    /// Terminate every running agent and flush the store.
    pub async fn shutdown(&self) -> Result<usize, ApiError> {
        let stopped = self.supervisor.shutdown_all().await;
        self.registry.flush()?;
        info!(stopped, "Directory shut down");
        Ok(stopped)
    }
}

/// Assembles an `AgentDirectory`, with seams for the transport, behavior
/// catalog and repository.
pub struct DirectoryBuilder {
    config: DirectoryConfig,
    transport: Option<Arc<dyn Transport>>,
    behaviors: Option<Arc<BehaviorCatalog>>,
    repository: Option<Arc<dyn IdentityRepository>>,
}

impl DirectoryBuilder {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            config,
            transport: None,
            behaviors: None,
            repository: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn behaviors(mut self, behaviors: Arc<BehaviorCatalog>) -> Self {
        self.behaviors = Some(behaviors);
        self
    }

    pub fn repository(mut self, repository: Arc<dyn IdentityRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn build(self) -> Result<AgentDirectory, ApiError> {
        let config = self.config;
        config.validate()?;

        let repository: Arc<dyn IdentityRepository> = match self.repository {
            Some(repository) => repository,
            None => match config.storage_path()? {
                Some(path) => Arc::new(SledIdentityRepository::open(&path)?),
                None => Arc::new(InMemoryIdentityRepository::new()),
            },
        };
        let registry = Arc::new(IdentityRegistry::open(
            repository,
            config.registry.name_uniqueness,
        )?);

        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(TcpTransport::new(
                Duration::from_millis(config.transport.connect_timeout_ms),
                Duration::from_millis(config.transport.io_timeout_ms),
                config.transport.max_frame_bytes,
            ))
        });
        let router = Arc::new(MessageRouter::new(
            registry.clone(),
            transport,
            config.router.policy(),
        ));

        let behaviors = self
            .behaviors
            .unwrap_or_else(|| Arc::new(BehaviorCatalog::with_builtins()));
        let supervisor = AgentSupervisor::new(
            registry.clone(),
            router.clone(),
            behaviors,
            config
                .supervisor
                .supervisor_config(config.transport.listen_addr.clone()),
        );

        Ok(AgentDirectory {
            registry,
            router,
            supervisor,
            loader: DescriptorLoader::new(),
        })
    }
}
