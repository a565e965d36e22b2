//! CLI Tooling
//!
//! Command-line interface for running a directory node and inspecting its
//! registry.

use crate::config::{ConfigLoader, DirectoryConfig};
use crate::descriptor::{DescriptorLoader, ListenSpec};
use crate::directory::AgentDirectory;
use crate::error::ApiError;
use crate::gateway;
use crate::identity::AgentRecord;
use crate::logging;
use crate::types::Did;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Maple agent directory: DID registry, agent runtime and message router
#[derive(Parser)]
#[command(name = "maple-directory")]
#[command(about = "Agent directory and messaging service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway and agent runtime until interrupted
    Serve,
    /// Register an agent identity without starting it
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        role: String,
    },
    /// Show the record behind a DID
    Resolve { did: String },
    /// List agent records
    List {
        /// Only agents with this role
        #[arg(long)]
        role: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Check a descriptor file without touching the registry
    Validate { file: PathBuf },
}

/// CLI context holding the resolved configuration
pub struct CliContext {
    config: DirectoryConfig,
}

impl CliContext {
    /// Load configuration and apply the CLI's logging overrides.
    pub fn new(cli: &Cli) -> Result<Self, ApiError> {
        let mut config = ConfigLoader::load(cli.config.as_deref())?;

        if let Some(level) = &cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &cli.log_output {
            config.logging.output = output.clone();
        }
        if let Some(file) = &cli.log_file {
            config.logging.file = Some(file.clone());
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn init_logging(&self) -> Result<(), ApiError> {
        logging::init_logging(Some(&self.config.logging))
    }

    /// Execute a CLI command, returning text for stdout.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Serve => self.serve().await,
            Commands::Register { name, role } => {
                let directory = AgentDirectory::open(&self.config)?;
                let did = directory.create_agent(name, role)?;
                directory.shutdown().await?;
                Ok(did.to_string())
            }
            Commands::Resolve { did } => {
                let did = Did::parse(did)
                    .ok_or_else(|| ApiError::InvalidRequest(format!("not a DID: {}", did)))?;
                let directory = AgentDirectory::open(&self.config)?;
                let record = directory.resolve(&did)?;
                serde_json::to_string_pretty(&record)
                    .map_err(|e| ApiError::InvalidRequest(e.to_string()))
            }
            Commands::List { role, format } => {
                let directory = AgentDirectory::open(&self.config)?;
                let records = directory.list_agents(role.as_deref());
                match format.as_str() {
                    "json" => serde_json::to_string_pretty(&records)
                        .map_err(|e| ApiError::InvalidRequest(e.to_string())),
                    "text" => Ok(format_record_table(&records)),
                    other => Err(ApiError::InvalidRequest(format!(
                        "unknown format '{}' (expected text or json)",
                        other
                    ))),
                }
            }
            Commands::Validate { file } => {
                let spec = DescriptorLoader::new().load_file(file)?;
                let listen = match &spec.listen {
                    ListenSpec::Auto => "auto".to_string(),
                    ListenSpec::Fixed(addr) => addr.to_string(),
                };
                Ok(format!(
                    "{} is valid\n  name:      {}\n  role:      {}\n  behaviors: {}\n  listen:    {}",
                    file.display(),
                    spec.name,
                    spec.role,
                    spec.behaviors.join(", "),
                    listen
                ))
            }
        }
    }

    async fn serve(&self) -> Result<String, ApiError> {
        let directory = Arc::new(AgentDirectory::open(&self.config)?);
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Interrupt received, shutting down");
        };

        gateway::serve(&self.config, directory.clone(), shutdown)
            .await
            .map_err(|e| ApiError::ConfigError(format!("gateway failed: {}", e)))?;

        let stopped = directory.shutdown().await?;
        Ok(format!("Stopped {} agent(s)", stopped))
    }
}

fn format_record_table(records: &[AgentRecord]) -> String {
    if records.is_empty() {
        return "No agents registered.".to_string();
    }

    use comfy_table::Table;
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["DID", "Name", "Role", "State", "Listen", "Updated"]);
    for r in records {
        let listen = r
            .listen_addr
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            r.did.to_string(),
            r.name.clone(),
            r.role.clone(),
            r.state.to_string(),
            listen,
            r.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    table.to_string()
}
