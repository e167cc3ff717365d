//! Configuration management for the query history store.
//!
//! This module provides configuration loading, validation, and access through a singleton pattern.
//! Configuration is read from settings under the "query-history" key and merged with defaults.

pub mod schema;

pub use schema::HistoryConfig;

use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::RwLock;

/// Settings key the configuration is read from.
pub const SETTINGS_KEY: &str = "query-history";

/// Global configuration instance.
///
/// This is lazily initialized on first access and can be updated when settings change.
static CONFIG: Lazy<RwLock<HistoryConfig>> = Lazy::new(|| RwLock::new(HistoryConfig::default()));

/// Loads configuration from a JSON settings value.
///
/// This function reads the "query-history" settings, merges them with defaults,
/// validates the result, and updates the global configuration.
///
/// # Arguments
///
/// * `settings_json` - Optional JSON value containing settings under the "query-history" key
///
/// # Returns
///
/// `Ok(HistoryConfig)` with the loaded configuration, or `Err` if validation fails.
///
/// # Example
///
/// ```no_run
/// use query_history::config::load_config;
/// use serde_json::json;
///
/// let settings = json!({
///     "query-history": {
///         "persistenceTimeoutMs": 2000
///     }
/// });
///
/// let config = load_config(Some(settings)).unwrap();
/// assert_eq!(config.persistence_timeout_ms, 2000);
/// ```
pub fn load_config(settings_json: Option<Value>) -> Result<HistoryConfig, String> {
    let mut config = HistoryConfig::default();

    if let Some(settings) = settings_json {
        if let Some(history_settings) = settings.get(SETTINGS_KEY) {
            match serde_json::from_value::<HistoryConfig>(history_settings.clone()) {
                Ok(user_config) => {
                    config = config.merge(&user_config);
                }
                Err(e) => {
                    log::warn!(
                        "Failed to parse {} settings: {}. Using defaults.",
                        SETTINGS_KEY,
                        e
                    );
                }
            }
        }
    }

    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    if let Ok(mut global_config) = CONFIG.write() {
        *global_config = config.clone();
    }

    Ok(config)
}

/// Gets the current global configuration.
///
/// Returns a clone of the current configuration, or the defaults if
/// nothing has been loaded yet.
pub fn get_config() -> HistoryConfig {
    CONFIG
        .read()
        .map(|c| c.clone())
        .unwrap_or_else(|_| HistoryConfig::default())
}

/// Updates the global configuration in place.
///
/// If the updated configuration fails validation, the defaults are restored.
///
/// # Example
///
/// ```no_run
/// use query_history::config::update_config;
///
/// update_config(|config| {
///     config.persistence_timeout_ms = 1000;
/// });
/// ```
pub fn update_config<F>(updater: F)
where
    F: FnOnce(&mut HistoryConfig),
{
    if let Ok(mut config) = CONFIG.write() {
        updater(&mut config);

        if let Err(e) = config.validate() {
            log::warn!("Configuration validation failed after update: {}", e);
            *config = HistoryConfig::default();
        }
    }
}

/// Resets the configuration to defaults.
pub fn reset_config() {
    if let Ok(mut config) = CONFIG.write() {
        *config = HistoryConfig::default();
    }
}
