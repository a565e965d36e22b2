//! Maple Directory: Agent Directory & Messaging Service
//!
//! Issues decentralized identifiers to agents, instantiates agents from
//! declarative descriptors, and routes messages between them by DID over an
//! authenticated HTTP gateway.

pub mod concurrency;
pub mod config;
pub mod descriptor;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod logging;
pub mod router;
pub mod runtime;
pub mod tooling;
pub mod transport;
pub mod types;

pub use directory::{AgentDirectory, DirectoryBuilder};
pub use error::ApiError;
pub use types::{AgentState, Did};
