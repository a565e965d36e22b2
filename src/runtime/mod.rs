//! Agent Runtime Supervisor
//!
//! Instantiates agents from validated descriptors, gives each one a TCP
//! execution context, and tears them down on request or on fault.

pub mod behavior;
mod context;
pub mod supervisor;

pub use behavior::{Behavior, BehaviorCatalog, BehaviorContext, LogBehavior, NoopBehavior};
pub use supervisor::{AgentSupervisor, SupervisorConfig, TerminationReport};
