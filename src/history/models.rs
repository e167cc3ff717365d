//! Data models for per-user query history.
//!
//! A [`UserRecord`] owns an ordered list of [`QueryEntry`] values, one per
//! distinct query string the user has submitted. Each entry keeps its runs as
//! a single sequence of [`Instance`] values, so an instance's id, metrics and
//! timestamp can never drift out of alignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use super::persistence::PersistenceError;

/// Text returned in place of a listing when the user has no record.
pub const NO_RESULTS_MESSAGE: &str = "No results found";

/// Generates a globally unique identifier for an entry or instance.
pub fn new_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Returns `true` if a metrics payload carries no data.
///
/// `null` and blank strings are treated as missing.
pub fn metrics_is_empty(metrics: &Value) -> bool {
    match metrics {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// One recorded run of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Unique identifier of this run.
    pub id: String,

    /// Output metrics reported for this run. Opaque to the store.
    pub output_metrics: Value,

    /// Human-readable time the run was recorded.
    pub timestamp: String,
}

impl Instance {
    /// Creates an instance with a freshly generated id.
    pub fn new(output_metrics: Value, timestamp: String) -> Self {
        Self {
            id: new_instance_id(),
            output_metrics,
            timestamp,
        }
    }
}

/// One distinct query string and every recorded run of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEntry {
    /// Stable identifier callers use to address this entry.
    pub id: String,

    /// The query text. Unique within a user's history.
    pub query_string: String,

    /// Recorded runs, oldest first.
    pub instances: Vec<Instance>,
}

impl QueryEntry {
    /// Creates a new entry seeded with its first instance.
    pub fn new(query_string: String, first: Instance) -> Self {
        Self {
            id: new_instance_id(),
            query_string,
            instances: vec![first],
        }
    }

    /// Number of instances currently recorded.
    pub fn counter(&self) -> usize {
        self.instances.len()
    }

    /// The most recently recorded instance.
    pub fn latest(&self) -> Option<&Instance> {
        self.instances.last()
    }

    /// Instance ids in recording order.
    pub fn instance_ids(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.id.as_str()).collect()
    }

    /// Output metrics in recording order, index-aligned with [`Self::instance_ids`].
    pub fn output_metrics(&self) -> Vec<&Value> {
        self.instances.iter().map(|i| &i.output_metrics).collect()
    }

    /// Timestamps in recording order, index-aligned with [`Self::instance_ids`].
    pub fn timestamps(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.timestamp.as_str()).collect()
    }

    /// Removes the instance with the given id.
    ///
    /// The index is located once and a single element is removed, so every
    /// remaining instance keeps its relative order.
    pub fn remove_instance(&mut self, instance_id: &str) -> Option<Instance> {
        let index = self.instances.iter().position(|i| i.id == instance_id)?;
        Some(self.instances.remove(index))
    }

    /// Builds the listing summary for this entry.
    pub fn summary(&self) -> QuerySummary {
        QuerySummary {
            query_string: self.query_string.clone(),
            timestamp: self.latest().map(|i| i.timestamp.clone()),
            id: self.id.clone(),
            counter: self.counter(),
        }
    }
}

/// The full query history of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Unique user name.
    pub username: String,

    /// Entries in first-seen order.
    #[serde(default)]
    pub query_history: Vec<QueryEntry>,
}

impl UserRecord {
    /// Creates a record with an empty history.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            query_history: Vec::new(),
        }
    }

    /// Looks up an entry by id. The first match wins.
    pub fn entry(&self, entry_id: &str) -> Option<&QueryEntry> {
        self.query_history.iter().find(|e| e.id == entry_id)
    }

    /// Records a run of `query_string`.
    ///
    /// Appends to the existing entry for that query, or creates a new entry
    /// at the end of the history. Fails without modifying the record if more
    /// than one entry already holds the query string.
    pub fn append_instance(
        &mut self,
        query_string: &str,
        instance: Instance,
    ) -> Result<AppendOutcome, HistoryError> {
        let matches: Vec<usize> = self
            .query_history
            .iter()
            .enumerate()
            .filter(|(_, e)| e.query_string == query_string)
            .map(|(idx, _)| idx)
            .collect();

        if matches.len() > 1 {
            return Err(HistoryError::IntegrityViolation(format!(
                "{} entries share the same query string for user '{}'",
                matches.len(),
                self.username
            )));
        }

        let instance_id = instance.id.clone();
        match matches.first() {
            Some(&idx) => {
                let entry = &mut self.query_history[idx];
                entry.instances.push(instance);
                Ok(AppendOutcome {
                    entry_id: entry.id.clone(),
                    instance_id,
                    created_entry: false,
                })
            }
            None => {
                let entry = QueryEntry::new(query_string.to_string(), instance);
                let entry_id = entry.id.clone();
                self.query_history.push(entry);
                Ok(AppendOutcome {
                    entry_id,
                    instance_id,
                    created_entry: true,
                })
            }
        }
    }

    /// Removes one instance from the entry `entry_id`.
    ///
    /// An entry left without instances is dropped from the history.
    /// Returns `true` if anything was removed.
    pub fn delete_instance(&mut self, entry_id: &str, instance_id: &str) -> bool {
        let mut removed = false;
        for entry in self.query_history.iter_mut().filter(|e| e.id == entry_id) {
            if entry.remove_instance(instance_id).is_some() {
                removed = true;
            }
        }

        if removed {
            self.query_history
                .retain(|e| !(e.id == entry_id && e.instances.is_empty()));
        }

        removed
    }

    /// Looks up a single instance. When duplicates exist the last match wins.
    pub fn instance_detail(&self, entry_id: &str, instance_id: &str) -> Option<InstanceDetail> {
        self.query_history
            .iter()
            .filter(|e| e.id == entry_id)
            .flat_map(|e| {
                e.instances
                    .iter()
                    .filter(|i| i.id == instance_id)
                    .map(move |i| InstanceDetail {
                        query_string: e.query_string.clone(),
                        output_metrics: i.output_metrics.clone(),
                        timestamp: i.timestamp.clone(),
                    })
            })
            .last()
    }

    /// Summaries of every entry in history order.
    pub fn summaries(&self) -> Vec<QuerySummary> {
        self.query_history.iter().map(QueryEntry::summary).collect()
    }

    /// Checks that query strings and instance ids are unique.
    pub fn check_integrity(&self) -> Result<(), HistoryError> {
        let mut queries = HashSet::new();
        for entry in &self.query_history {
            if !queries.insert(entry.query_string.as_str()) {
                return Err(HistoryError::IntegrityViolation(format!(
                    "duplicate query string in history of user '{}'",
                    self.username
                )));
            }

            let mut ids = HashSet::new();
            if entry.instances.iter().any(|i| !ids.insert(i.id.as_str())) {
                return Err(HistoryError::IntegrityViolation(format!(
                    "duplicate instance id in entry {}",
                    entry.id
                )));
            }
        }
        Ok(())
    }
}

/// Result of recording a query run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendOutcome {
    /// Entry the run was recorded under.
    pub entry_id: String,
    /// Id generated for the run.
    pub instance_id: String,
    /// Whether a new entry was created for the query string.
    pub created_entry: bool,
}

/// Listing row for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySummary {
    pub query_string: String,
    /// Timestamp of the most recent instance.
    pub timestamp: Option<String>,
    pub id: String,
    /// Number of recorded instances.
    pub counter: usize,
}

/// Detail of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDetail {
    pub query_string: String,
    pub output_metrics: Value,
    pub timestamp: String,
}

/// Listing of a user's queries.
///
/// Serializes to the text [`NO_RESULTS_MESSAGE`] when the user has no
/// record, and to an array of summaries otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryListing {
    NoResults,
    Queries(Vec<QuerySummary>),
}

impl QueryListing {
    /// Returns the summaries, or an empty slice for [`QueryListing::NoResults`].
    pub fn summaries(&self) -> &[QuerySummary] {
        match self {
            QueryListing::NoResults => &[],
            QueryListing::Queries(items) => items,
        }
    }
}

impl Serialize for QueryListing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            QueryListing::NoResults => serializer.serialize_str(NO_RESULTS_MESSAGE),
            QueryListing::Queries(items) => items.serialize(serializer),
        }
    }
}

/// A standalone metrics document, stored apart from user records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    pub id: String,
    pub username: String,
    pub query_string: String,
    pub output_metrics: Value,
    pub recorded_at: DateTime<Utc>,
}

impl MetricsRecord {
    /// Creates a record with a fresh id, stamped now.
    pub fn new(username: String, query_string: String, output_metrics: Value) -> Self {
        Self {
            id: new_instance_id(),
            username,
            query_string,
            output_metrics,
            recorded_at: Utc::now(),
        }
    }
}

/// Errors returned by query history operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// A required argument was missing or empty.
    InvalidInput {
        /// Name of the offending argument
        field: &'static str,
    },

    /// The user was expected to exist but has no record.
    UserNotFound(String),

    /// The persistence layer failed, timed out, or was unreachable.
    ///
    /// Carries a summary only; backend details are logged, not returned.
    PersistenceFailure(String),

    /// Stored data breaks a uniqueness rule.
    IntegrityViolation(String),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::InvalidInput { field } => write!(f, "Invalid input: {} is required", field),
            HistoryError::UserNotFound(username) => write!(f, "User not found: {}", username),
            HistoryError::PersistenceFailure(msg) => write!(f, "Persistence failure: {}", msg),
            HistoryError::IntegrityViolation(msg) => write!(f, "Integrity violation: {}", msg),
        }
    }
}

impl std::error::Error for HistoryError {}

impl From<PersistenceError> for HistoryError {
    fn from(err: PersistenceError) -> Self {
        HistoryError::PersistenceFailure(err.summary().to_string())
    }
}
