//! Integration tests module for Query History
//!
//! Shared helpers for building stores and seeding users.

pub mod file_backend_test;
pub mod scenario_test;

use query_history::history::{MemoryPersistence, Persistence, QueryHistoryStore, StoreConfig};
use std::sync::Once;
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize test environment (run once)
pub fn init_test_env() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Store settings used across the integration suite.
pub fn test_config() -> StoreConfig {
    StoreConfig {
        persistence_timeout: Duration::from_secs(5),
        utc_offset_minutes: Some(-240),
    }
}

/// Builds a store over a backend with the shared test settings.
pub fn store_with<P: Persistence>(persistence: P) -> QueryHistoryStore<P> {
    init_test_env();
    QueryHistoryStore::with_config(persistence, test_config())
}

/// Builds an in-memory store.
pub fn memory_store() -> QueryHistoryStore<MemoryPersistence> {
    store_with(MemoryPersistence::new())
}
