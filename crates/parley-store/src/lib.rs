//! Authoritative-storage boundary for the Parley synchronization engine.
//!
//! The engine treats durable storage as an external collaborator reached
//! through the read-only [`StateReader`] trait. [`MemoryStore`] is the
//! in-memory reference implementation used by tests and local runs; its
//! mutators additionally emit the events the real write path would, so
//! equivalence tests can replay exactly what storage recorded.
//!
//! # Modules
//!
//! - [`reader`] -- The [`StateReader`] accessor trait
//! - [`memory`] -- The in-memory reference implementation
//! - [`error`] -- [`StoreError`]

pub mod error;
pub mod memory;
pub mod reader;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use reader::{StateReader, SubscriptionSets};
