//! Identity repository port and adapters.

pub mod contract;
pub mod memory;
pub mod sled_store;

pub use contract::IdentityRepository;
pub use memory::InMemoryIdentityRepository;
pub use sled_store::SledIdentityRepository;
