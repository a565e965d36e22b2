//! Tooling & Integration Layer
//!
//! Command-line entry points for operating a directory node.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
