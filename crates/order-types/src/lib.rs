//! Common types for the order state machine service.
//!
//! Defines the closed state and event vocabularies, the persisted order record,
//! storage key namespaces and the configuration validation helpers shared by
//! the storage, config and core crates.

/// Persisted order record.
pub mod order;
/// Registry trait for self-registering backend implementations.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// Configuration validation types for backend-specific TOML tables.
pub mod validation;
/// Closed state and event vocabularies.
pub mod vocabulary;

pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use validation::*;
pub use vocabulary::*;
