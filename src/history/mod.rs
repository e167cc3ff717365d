//! Per-user query history tracking and persistence.
//!
//! This module records every run of a user's queries, grouped by distinct
//! query string, and exposes operations to list, inspect and prune them.
//!
//! # Features
//!
//! - Find-or-create user records
//! - Append runs to the matching query entry, or start a new entry
//! - List entries with their latest timestamp and run count
//! - Fetch an entry or a single run
//! - Delete a single run, or a standalone metrics document
//! - Per-user serialization of read-modify-write transactions
//! - In-memory and JSON file persistence backends
//!
//! # Example
//!
//! ```ignore
//! use history::{MemoryPersistence, QueryHistoryStore};
//!
//! let store = QueryHistoryStore::new(MemoryPersistence::new());
//! store.find_or_create_user("alice").await?;
//! store.append_instance("alice", "SELECT 1", json!("rows=1")).await?;
//! let listing = store.list_queries("alice").await?;
//! ```

pub mod models;
pub mod persistence;
pub mod storage;
pub mod store;
pub mod timestamp;

// Re-export commonly used types
pub use models::{
    AppendOutcome, HistoryError, Instance, InstanceDetail, MetricsRecord, QueryEntry,
    QueryListing, QuerySummary, UserRecord, NO_RESULTS_MESSAGE,
};
pub use persistence::{MemoryPersistence, Persistence, PersistenceError};
pub use storage::FilePersistence;
pub use store::{QueryHistoryStore, StoreConfig};
pub use timestamp::{current_timestamp, format_timestamp};
