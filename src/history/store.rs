//! The query history store.
//!
//! Every operation is one read-modify-write transaction over a user's whole
//! record. Transactions for the same user are serialized through a per-user
//! async mutex; different users never wait on each other. Persistence calls
//! run on the blocking pool and are bounded by the configured timeout.

use super::models::{
    metrics_is_empty, AppendOutcome, HistoryError, Instance, InstanceDetail, MetricsRecord,
    QueryEntry, QueryListing, UserRecord,
};
use super::persistence::{Persistence, PersistenceError};
use super::timestamp::current_timestamp;
use crate::config::{get_config, HistoryConfig};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Runtime settings for a [`QueryHistoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Upper bound for each persistence call.
    pub persistence_timeout: Duration,

    /// Offset used for instance timestamps; `None` means local time.
    pub utc_offset_minutes: Option<i32>,
}

impl Default for StoreConfig {
    /// Builds the settings from the global configuration.
    fn default() -> Self {
        Self::from(&get_config())
    }
}

impl From<&HistoryConfig> for StoreConfig {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            persistence_timeout: config.persistence_timeout(),
            utc_offset_minutes: config.utc_offset_minutes,
        }
    }
}

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// Exclusive access to one user's record.
///
/// Shared with every persistence call started under it, so the user stays
/// locked until the holder and all of those calls are done, including calls
/// whose caller already gave up on a timeout. The table entry is removed once
/// nobody holds or awaits the lock.
struct UserLock {
    guard: Option<OwnedMutexGuard<()>>,
    username: String,
    locks: Arc<LockTable>,
}

impl Drop for UserLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.username, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Per-user query history over a [`Persistence`] backend.
pub struct QueryHistoryStore<P: Persistence> {
    persistence: Arc<P>,
    locks: Arc<LockTable>,
    config: StoreConfig,
}

impl<P: Persistence> Clone for QueryHistoryStore<P> {
    fn clone(&self) -> Self {
        Self {
            persistence: Arc::clone(&self.persistence),
            locks: Arc::clone(&self.locks),
            config: self.config.clone(),
        }
    }
}

impl<P: Persistence> QueryHistoryStore<P> {
    /// Creates a store using the global configuration.
    pub fn new(persistence: P) -> Self {
        Self::with_config(persistence, StoreConfig::default())
    }

    /// Creates a store with explicit settings.
    pub fn with_config(persistence: P, config: StoreConfig) -> Self {
        Self {
            persistence: Arc::new(persistence),
            locks: Arc::new(DashMap::new()),
            config,
        }
    }

    /// The backend this store writes to.
    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Settings this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the user's record, creating an empty one on first contact.
    ///
    /// Repeated or concurrent calls for the same name create one record.
    pub async fn find_or_create_user(&self, username: &str) -> Result<UserRecord, HistoryError> {
        let username = require(username, "username")?.to_string();
        let lock = self.lock_user(&username).await;

        if let Some(record) = self.find(&username, &lock).await? {
            return Ok(record);
        }

        log::info!("Creating history record for user '{}'", username);
        let name = username.clone();
        self.call("create user", Some(&lock), move |p| p.create_user(&name))
            .await
    }

    /// Records one run of `query_string` for an existing user.
    ///
    /// The run joins the entry already holding that query string, or starts
    /// a new entry at the end of the user's history.
    pub async fn append_instance(
        &self,
        username: &str,
        query_string: &str,
        output_metrics: Value,
    ) -> Result<AppendOutcome, HistoryError> {
        let username = require(username, "username")?.to_string();
        let query_string = require(query_string, "queryString")?;
        if metrics_is_empty(&output_metrics) {
            return Err(HistoryError::InvalidInput {
                field: "outputMetrics",
            });
        }

        let lock = self.lock_user(&username).await;
        let mut record = self
            .find(&username, &lock)
            .await?
            .ok_or_else(|| HistoryError::UserNotFound(username.clone()))?;

        let instance = Instance::new(
            output_metrics,
            current_timestamp(self.config.utc_offset_minutes),
        );
        let outcome = record.append_instance(query_string, instance)?;
        if outcome.created_entry {
            log::info!(
                "New query entry {} for user '{}'",
                outcome.entry_id,
                username
            );
        }

        self.save(record, &lock).await?;
        log::debug!(
            "Recorded instance {} under entry {} for user '{}'",
            outcome.instance_id,
            outcome.entry_id,
            username
        );
        Ok(outcome)
    }

    /// Lists the user's queries with their latest timestamp and instance count.
    pub async fn list_queries(&self, username: &str) -> Result<QueryListing, HistoryError> {
        let username = require(username, "username")?;
        let lock = self.lock_user(username).await;

        Ok(match self.find(username, &lock).await? {
            Some(record) => QueryListing::Queries(record.summaries()),
            None => QueryListing::NoResults,
        })
    }

    /// Fetches one entry with all of its instances.
    pub async fn query_detail(
        &self,
        username: &str,
        entry_id: &str,
    ) -> Result<Option<QueryEntry>, HistoryError> {
        let username = require(username, "username")?;
        let entry_id = require(entry_id, "queryId")?;
        let lock = self.lock_user(username).await;

        Ok(self
            .find(username, &lock)
            .await?
            .and_then(|record| record.entry(entry_id).cloned()))
    }

    /// Fetches a single instance of an entry.
    pub async fn instance_detail(
        &self,
        username: &str,
        entry_id: &str,
        instance_id: &str,
    ) -> Result<Option<InstanceDetail>, HistoryError> {
        let username = require(username, "username")?;
        let entry_id = require(entry_id, "queryId")?;
        let instance_id = require(instance_id, "instanceId")?;
        let lock = self.lock_user(username).await;

        Ok(self
            .find(username, &lock)
            .await?
            .and_then(|record| record.instance_detail(entry_id, instance_id)))
    }

    /// Stores a standalone metrics document.
    pub async fn save_metrics(
        &self,
        username: &str,
        query_string: &str,
        output_metrics: Value,
    ) -> Result<MetricsRecord, HistoryError> {
        let username = require(username, "username")?;
        let query_string = require(query_string, "queryString")?;
        if metrics_is_empty(&output_metrics) {
            return Err(HistoryError::InvalidInput {
                field: "outputMetrics",
            });
        }

        let record = MetricsRecord::new(
            username.to_string(),
            query_string.to_string(),
            output_metrics,
        );
        let stored = record.clone();
        self.call("save metrics", None, move |p| p.save_metrics(&stored))
            .await?;
        Ok(record)
    }

    /// Deletes a standalone metrics document by id.
    ///
    /// A missing document is reported as a persistence failure.
    pub async fn delete_metrics(&self, instance_id: &str) -> Result<(), HistoryError> {
        let id = require(instance_id, "instanceId")?.to_string();
        self.call("delete metrics", None, move |p| p.delete_metrics(&id))
            .await
    }

    /// Removes one instance from an entry.
    ///
    /// Succeeds without writing when nothing matches. An entry whose last
    /// instance is removed is dropped from the history. Returns `true` if
    /// an instance was removed.
    pub async fn delete_instance(
        &self,
        username: &str,
        entry_id: &str,
        instance_id: &str,
    ) -> Result<bool, HistoryError> {
        let username = require(username, "username")?.to_string();
        let entry_id = require(entry_id, "queryId")?;
        let instance_id = require(instance_id, "instanceId")?;

        let lock = self.lock_user(&username).await;
        let mut record = self
            .find(&username, &lock)
            .await?
            .ok_or_else(|| HistoryError::UserNotFound(username.clone()))?;

        if !record.delete_instance(entry_id, instance_id) {
            log::debug!(
                "No instance {} under entry {} for user '{}'",
                instance_id,
                entry_id,
                username
            );
            return Ok(false);
        }

        self.save(record, &lock).await?;
        log::debug!(
            "Deleted instance {} from entry {} for user '{}'",
            instance_id,
            entry_id,
            username
        );
        Ok(true)
    }

    async fn lock_user(&self, username: &str) -> Arc<UserLock> {
        let lock = self
            .locks
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;

        Arc::new(UserLock {
            guard: Some(guard),
            username: username.to_string(),
            locks: Arc::clone(&self.locks),
        })
    }

    async fn find(
        &self,
        username: &str,
        lock: &Arc<UserLock>,
    ) -> Result<Option<UserRecord>, HistoryError> {
        let name = username.to_string();
        self.call("find user", Some(lock), move |p| p.find_user(&name))
            .await
    }

    async fn save(&self, record: UserRecord, lock: &Arc<UserLock>) -> Result<(), HistoryError> {
        self.call("save user", Some(lock), move |p| p.save_user(&record))
            .await
    }

    /// Runs a persistence call on the blocking pool, bounded by the timeout.
    ///
    /// A user lock passed in is held by the call itself until the backend
    /// returns, even when the caller has already timed out.
    async fn call<T, F>(
        &self,
        operation: &'static str,
        lock: Option<&Arc<UserLock>>,
        f: F,
    ) -> Result<T, HistoryError>
    where
        T: Send + 'static,
        F: FnOnce(&P) -> Result<T, PersistenceError> + Send + 'static,
    {
        let persistence = Arc::clone(&self.persistence);
        let held = lock.cloned();
        let task = tokio::task::spawn_blocking(move || {
            let result = f(persistence.as_ref());
            drop(held);
            result
        });

        let err = match tokio::time::timeout(self.config.persistence_timeout, task).await {
            Ok(Ok(Ok(value))) => return Ok(value),
            Ok(Ok(Err(e))) => e,
            Ok(Err(join_err)) => PersistenceError::Backend(join_err.to_string()),
            Err(_) => PersistenceError::Timeout,
        };

        log::warn!("Persistence call '{}' failed: {}", operation, err);
        Err(err.into())
    }
}

/// Rejects blank required arguments.
fn require<'a>(value: &'a str, field: &'static str) -> Result<&'a str, HistoryError> {
    if value.trim().is_empty() {
        Err(HistoryError::InvalidInput { field })
    } else {
        Ok(value)
    }
}
