//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. Services depend
//! on these traits, not on concrete implementations.

mod repository;

pub use repository::TransactionStore;
