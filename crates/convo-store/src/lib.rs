//! # convo-store
//!
//! Domain models and the multi-entity operations that keep their
//! cross-references, read state and membership consistent on top of a
//! non-transactional document store.
//!
//! The [`Database`] handle wraps any [`Datastore`] and provides typed
//! operations for every model. [`MemoryStore`] is the in-process backend
//! used for development and tests.

pub mod database;
pub mod datastore;
pub mod digest;
pub mod events;
pub mod memory;
pub mod merge;
pub mod messages;
pub mod models;
pub mod threads;
pub mod users;

mod error;

pub use database::{Database, Entity, Tx};
pub use datastore::{Datastore, Direction, Query, Transaction};
pub use digest::{Digest, DigestItem, Digestable};
pub use error::StoreError;
pub use memory::{CallStats, MemoryStore};
pub use merge::{MergeGuard, MergeLocks, MergeReport};
pub use models::*;
