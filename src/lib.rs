//! Query History
//!
//! Records, per user, every distinct query they submit and each run
//! ("instance") of it, with the run's output metrics and a human-readable
//! timestamp.
//!
//! # Architecture
//!
//! The crate is organized into a few modules:
//!
//! - **history**: the record model, the store and its persistence backends
//! - **commands**: request-facing handlers that validate parameters and shape results
//! - **config**: configuration loading and validation
//!
//! # Consistency
//!
//! Each store operation loads the user's whole record, mutates it in memory
//! and saves it back. Operations on the same user run one at a time; operations
//! on different users run independently. Every persistence call is bounded by
//! the configured timeout.
//!
//! # Usage
//!
//! ```no_run
//! use query_history::history::{MemoryPersistence, QueryHistoryStore};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), query_history::history::HistoryError> {
//! let store = QueryHistoryStore::new(MemoryPersistence::new());
//! store.find_or_create_user("alice").await?;
//!
//! let run = store
//!     .append_instance("alice", "SELECT 1", json!({"rows": 1, "ms": 4}))
//!     .await?;
//!
//! for summary in store.list_queries("alice").await?.summaries() {
//!     println!("{} ({} runs)", summary.query_string, summary.counter);
//! }
//!
//! store
//!     .delete_instance("alice", &run.entry_id, &run.instance_id)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod history;

pub use commands::{CommandError, HistoryCommands};
pub use history::{
    FilePersistence, HistoryError, MemoryPersistence, Persistence, QueryHistoryStore, StoreConfig,
};
