//! Descriptor Loader
//!
//! Turns spawn files (`.map` descriptors, YAML or JSON) into validated
//! `AgentSpecification`s.

pub mod loader;
pub mod specification;

pub use loader::DescriptorLoader;
pub use specification::{AgentSpecification, ListenSpec, ResourceLimits};
