//! Command handlers over the query history store.
//!
//! Each handler takes request parameters as they arrive from the caller
//! (possibly missing), runs one store operation and shapes the result.
//! Failures become a [`CommandError`] carrying a status code, a message safe
//! to show to users, and a log line naming the handler.

use crate::history::{
    AppendOutcome, HistoryError, MetricsRecord, Persistence, QueryHistoryStore, QueryListing,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Status code reported for every failed command.
pub const BAD_REQUEST: u16 = 400;

/// Error returned by a command handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandError {
    /// Status code for the caller.
    pub code: u16,

    /// User-facing message. Never contains storage details.
    pub message: String,

    /// Diagnostic line naming the handler that failed.
    pub log: String,
}

impl CommandError {
    fn new(message: &str, log: String) -> Self {
        Self {
            code: BAD_REQUEST,
            message: message.to_string(),
            log,
        }
    }

    fn from_history(handler: &str, err: HistoryError) -> Self {
        match err {
            HistoryError::InvalidInput { field } => Self::new(
                "Invalid params.",
                format!("logs.{}: Did not receive {}.", handler, field),
            ),
            HistoryError::UserNotFound(_) => Self::new(
                "Error with user retrieval",
                format!("logs.{}: Error with DB when searching for user", handler),
            ),
            HistoryError::PersistenceFailure(summary) => Self::new(
                "Error with storage",
                format!("logs.{}: {}", handler, summary),
            ),
            HistoryError::IntegrityViolation(detail) => Self::new(
                "Error with query history",
                format!("logs.{}: {}", handler, detail),
            ),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({})", self.code, self.message, self.log)
    }
}

impl std::error::Error for CommandError {}

/// Request-facing handlers for the query history store.
pub struct HistoryCommands<P: Persistence> {
    store: QueryHistoryStore<P>,
}

impl<P: Persistence> HistoryCommands<P> {
    pub fn new(store: QueryHistoryStore<P>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &QueryHistoryStore<P> {
        &self.store
    }

    /// Ensures a record exists for the user.
    pub async fn find_user(&self, username: Option<&str>) -> Result<(), CommandError> {
        const HANDLER: &str = "findUser";
        let username = param(HANDLER, username, "username")?;
        self.store
            .find_or_create_user(username)
            .await
            .map(|_| ())
            .map_err(|e| CommandError::from_history(HANDLER, e))
    }

    /// Records a query run for the user.
    pub async fn add_log(
        &self,
        username: Option<&str>,
        query_string: Option<&str>,
        output_metrics: Option<Value>,
    ) -> Result<AppendOutcome, CommandError> {
        const HANDLER: &str = "addLog";
        let username = param(HANDLER, username, "username")?;
        let query_string = param(HANDLER, query_string, "queryString")?;
        let output_metrics = param(HANDLER, output_metrics, "outputMetrics")?;

        self.store
            .append_instance(username, query_string, output_metrics)
            .await
            .map_err(|e| CommandError::from_history(HANDLER, e))
    }

    /// Lists the user's queries.
    pub async fn display_logs(&self, username: Option<&str>) -> Result<QueryListing, CommandError> {
        const HANDLER: &str = "displayLogs";
        let username = param(HANDLER, username, "username")?;
        self.store
            .list_queries(username)
            .await
            .map_err(|e| CommandError::from_history(HANDLER, e))
    }

    /// Returns one entry, or an empty array when it does not exist.
    pub async fn display_log(
        &self,
        username: Option<&str>,
        query_id: Option<&str>,
    ) -> Result<Value, CommandError> {
        const HANDLER: &str = "displayLog";
        let username = param(HANDLER, username, "username")?;
        let query_id = param(HANDLER, query_id, "queryId")?;

        let entry = self
            .store
            .query_detail(username, query_id)
            .await
            .map_err(|e| CommandError::from_history(HANDLER, e))?;

        match entry {
            Some(entry) => to_value(HANDLER, &entry),
            None => Ok(json!([])),
        }
    }

    /// Returns one instance, or an empty object when it does not exist.
    pub async fn display_instance(
        &self,
        username: Option<&str>,
        query_id: Option<&str>,
        instance_id: Option<&str>,
    ) -> Result<Value, CommandError> {
        const HANDLER: &str = "displayInstance";
        let username = param(HANDLER, username, "username")?;
        let query_id = param(HANDLER, query_id, "queryId")?;
        let instance_id = param(HANDLER, instance_id, "instanceId")?;

        let detail = self
            .store
            .instance_detail(username, query_id, instance_id)
            .await
            .map_err(|e| CommandError::from_history(HANDLER, e))?;

        match detail {
            Some(detail) => to_value(HANDLER, &detail),
            None => Ok(json!({})),
        }
    }

    /// Stores a standalone metrics document.
    pub async fn add_metrics(
        &self,
        username: Option<&str>,
        query_string: Option<&str>,
        output_metrics: Option<Value>,
    ) -> Result<MetricsRecord, CommandError> {
        const HANDLER: &str = "addMetrics";
        let username = param(HANDLER, username, "username")?;
        let query_string = param(HANDLER, query_string, "queryString")?;
        let output_metrics = param(HANDLER, output_metrics, "outputMetrics")?;

        self.store
            .save_metrics(username, query_string, output_metrics)
            .await
            .map_err(|e| CommandError::from_history(HANDLER, e))
    }

    /// Deletes a standalone metrics document.
    pub async fn delete_log(&self, instance_id: Option<&str>) -> Result<(), CommandError> {
        const HANDLER: &str = "deleteLog";
        let instance_id = param(HANDLER, instance_id, "instanceId")?;

        self.store
            .delete_metrics(instance_id)
            .await
            .map_err(|e| match e {
                HistoryError::PersistenceFailure(summary) => CommandError::new(
                    "Error with query deletion",
                    format!("logs.{}: {}", HANDLER, summary),
                ),
                other => CommandError::from_history(HANDLER, other),
            })
    }

    /// Deletes one instance of an entry. Unknown ids are not an error.
    pub async fn delete_instance(
        &self,
        username: Option<&str>,
        query_id: Option<&str>,
        instance_id: Option<&str>,
    ) -> Result<(), CommandError> {
        const HANDLER: &str = "deleteInstance";
        let username = param(HANDLER, username, "username")?;
        let query_id = param(HANDLER, query_id, "queryId")?;
        let instance_id = param(HANDLER, instance_id, "instanceId")?;

        self.store
            .delete_instance(username, query_id, instance_id)
            .await
            .map(|_| ())
            .map_err(|e| CommandError::from_history(HANDLER, e))
    }
}

fn param<T>(handler: &str, value: Option<T>, field: &'static str) -> Result<T, CommandError> {
    value.ok_or_else(|| CommandError::from_history(handler, HistoryError::InvalidInput { field }))
}

fn to_value<T: Serialize>(handler: &str, value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|e| {
        log::warn!("logs.{}: failed to encode result: {}", handler, e);
        CommandError::new("Error with query history", format!("logs.{}: encoding failed", handler))
    })
}
