//! File-backed persistence for query history.
//!
//! Each user record is stored as one JSON document under `<root>/users/`,
//! replaced atomically (write to a temporary file, then rename). Raw metrics
//! documents are kept in `<root>/metrics.jsonl`, one JSON document per line,
//! so saving is a cheap append and deleting rewrites the file.

use super::models::{MetricsRecord, UserRecord};
use super::persistence::{Persistence, PersistenceError};
use crate::config::HistoryConfig;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const USERS_DIR: &str = "users";
const METRICS_FILE: &str = "metrics.jsonl";

/// Longest encoded user name used verbatim as a file stem.
const MAX_ENCODED_NAME: usize = 120;

/// Length of the readable prefix kept in front of the digest for longer names.
const HASHED_NAME_PREFIX: usize = 48;

/// Persistence backend writing JSON files below a root directory.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    root: PathBuf,
    /// Serializes appends and rewrites of the metrics file.
    metrics_lock: Arc<Mutex<()>>,
}

impl FilePersistence {
    /// Opens (and creates if needed) a data directory.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Io` if the directories cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        let users_dir = root.join(USERS_DIR);
        if !users_dir.exists() {
            fs::create_dir_all(&users_dir)?;
        }

        Ok(Self {
            root,
            metrics_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Opens the data directory named by `config.data_dir`.
    pub fn from_config(config: &HistoryConfig) -> Result<Self, PersistenceError> {
        Self::new(&config.data_dir)
    }

    /// Root data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_path(&self, username: &str) -> PathBuf {
        self.root
            .join(USERS_DIR)
            .join(format!("{}.json", encode_file_name(username)))
    }

    fn metrics_path(&self) -> PathBuf {
        self.root.join(METRICS_FILE)
    }

    fn lock_metrics(&self) -> Result<MutexGuard<'_, ()>, PersistenceError> {
        self.metrics_lock
            .lock()
            .map_err(|_| PersistenceError::Backend("metrics lock poisoned".to_string()))
    }

    /// Loads every readable metrics document.
    ///
    /// Corrupted lines are skipped and logged.
    pub fn load_metrics(&self) -> Result<Vec<MetricsRecord>, PersistenceError> {
        let _guard = self.lock_metrics()?;
        self.read_metrics_file()
    }

    fn read_metrics_file(&self) -> Result<Vec<MetricsRecord>, PersistenceError> {
        let path = self.metrics_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        let mut corrupted_lines = 0;

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<MetricsRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    corrupted_lines += 1;
                    log::warn!(
                        "Skipping corrupted metrics record at line {}: {}",
                        line_num + 1,
                        e
                    );
                }
            }
        }

        if corrupted_lines > 0 && corrupted_lines > records.len() {
            log::warn!(
                "Metrics file has significant corruption ({} corrupted lines, {} valid records)",
                corrupted_lines,
                records.len()
            );
        }

        Ok(records)
    }
}

impl Persistence for FilePersistence {
    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, PersistenceError> {
        let path = self.user_path(username);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)?;
        let record: UserRecord = serde_json::from_str(&contents)?;
        if record.username != username {
            return Err(PersistenceError::Backend(format!(
                "{} belongs to another user",
                path.display()
            )));
        }
        Ok(Some(record))
    }

    fn create_user(&self, username: &str) -> Result<UserRecord, PersistenceError> {
        if let Some(existing) = self.find_user(username)? {
            return Ok(existing);
        }

        let record = UserRecord::new(username);
        self.save_user(&record)?;
        Ok(record)
    }

    fn save_user(&self, record: &UserRecord) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(record)?;
        write_atomic(&self.user_path(&record.username), json.as_bytes())
    }

    fn save_metrics(&self, record: &MetricsRecord) -> Result<(), PersistenceError> {
        let _guard = self.lock_metrics()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.metrics_path())?;

        let json = serde_json::to_string(record)?;
        writeln!(file, "{}", json)?;
        file.flush()?;

        Ok(())
    }

    fn delete_metrics(&self, id: &str) -> Result<(), PersistenceError> {
        let _guard = self.lock_metrics()?;

        let mut records = self.read_metrics_file()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(PersistenceError::NotFound(id.to_string()));
        }

        let mut contents = String::new();
        for record in &records {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }

        write_atomic(&self.metrics_path(), contents.as_bytes())
    }
}

/// Writes `contents` to a temporary sibling file and renames it over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let temp_path = path.with_extension("tmp");
    let mut temp_file = File::create(&temp_path)?;
    temp_file.write_all(contents)?;
    temp_file.flush()?;
    temp_file.sync_all()?;
    drop(temp_file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Maps a user name onto a portable file name.
///
/// ASCII letters, digits and `-` are kept; every other byte becomes `_xx`
/// (lowercase hex), which keeps distinct names distinct. Encodings longer
/// than [`MAX_ENCODED_NAME`] are cut to a prefix followed by `~` and the
/// SHA-256 of the name, so every stem fits common file-name limits.
fn encode_file_name(username: &str) -> String {
    let mut encoded = String::with_capacity(username.len());
    for byte in username.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("_{:02x}", byte));
        }
    }

    if encoded.len() <= MAX_ENCODED_NAME {
        return encoded;
    }

    let digest = Sha256::digest(username.as_bytes());
    format!("{}~{:x}", &encoded[..HASHED_NAME_PREFIX], digest)
}
