//! Persistence interface consumed by the query history store.
//!
//! Backends load and save whole [`UserRecord`] documents and manage the
//! separate collection of raw [`MetricsRecord`] documents. Calls are
//! synchronous; the store runs them off the async executor and bounds them
//! with a timeout.

use super::models::{MetricsRecord, UserRecord};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Storage operations needed by the store.
pub trait Persistence: Send + Sync + 'static {
    /// Loads the record for `username`, if one exists.
    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, PersistenceError>;

    /// Creates and stores an empty record for `username`.
    fn create_user(&self, username: &str) -> Result<UserRecord, PersistenceError>;

    /// Replaces the stored record with `record`.
    fn save_user(&self, record: &UserRecord) -> Result<(), PersistenceError>;

    /// Stores a raw metrics document.
    fn save_metrics(&self, record: &MetricsRecord) -> Result<(), PersistenceError>;

    /// Deletes a raw metrics document by id.
    ///
    /// A missing document is an error.
    fn delete_metrics(&self, id: &str) -> Result<(), PersistenceError>;
}

/// Errors raised by persistence backends.
#[derive(Debug)]
pub enum PersistenceError {
    /// File or device I/O failed.
    Io(std::io::Error),

    /// A document could not be encoded or decoded.
    Serialization(serde_json::Error),

    /// The addressed document does not exist.
    NotFound(String),

    /// The call did not complete within the configured timeout.
    Timeout,

    /// Any other backend failure.
    Backend(String),
}

impl PersistenceError {
    /// Short description that carries no backend detail.
    pub fn summary(&self) -> &'static str {
        match self {
            PersistenceError::Io(_) => "storage I/O failed",
            PersistenceError::Serialization(_) => "stored document is unreadable",
            PersistenceError::NotFound(_) => "document not found",
            PersistenceError::Timeout => "storage call timed out",
            PersistenceError::Backend(_) => "storage backend error",
        }
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Io(err) => write!(f, "Storage I/O error: {}", err),
            PersistenceError::Serialization(err) => write!(f, "Serialization error: {}", err),
            PersistenceError::NotFound(id) => write!(f, "Document not found: {}", id),
            PersistenceError::Timeout => write!(f, "Storage call timed out"),
            PersistenceError::Backend(msg) => write!(f, "Storage backend error: {}", msg),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Io(err) => Some(err),
            PersistenceError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io(err)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err)
    }
}

/// In-memory backend.
///
/// Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    users: Arc<DashMap<String, UserRecord>>,
    metrics: Arc<DashMap<String, MetricsRecord>>,
}

impl MemoryPersistence {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored user records.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of stored metrics documents.
    pub fn metrics_count(&self) -> usize {
        self.metrics.len()
    }

    /// Stores `record` as-is, bypassing the store. Useful for seeding.
    pub fn insert_user(&self, record: UserRecord) {
        self.users.insert(record.username.clone(), record);
    }
}

impl Persistence for MemoryPersistence {
    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, PersistenceError> {
        Ok(self.users.get(username).map(|r| r.value().clone()))
    }

    fn create_user(&self, username: &str) -> Result<UserRecord, PersistenceError> {
        let record = self
            .users
            .entry(username.to_string())
            .or_insert_with(|| UserRecord::new(username))
            .value()
            .clone();
        Ok(record)
    }

    fn save_user(&self, record: &UserRecord) -> Result<(), PersistenceError> {
        self.users.insert(record.username.clone(), record.clone());
        Ok(())
    }

    fn save_metrics(&self, record: &MetricsRecord) -> Result<(), PersistenceError> {
        self.metrics.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete_metrics(&self, id: &str) -> Result<(), PersistenceError> {
        self.metrics
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }
}
