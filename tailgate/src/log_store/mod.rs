//! In-memory event log for backend processing
//!
//! The store is an ordered, append-only sequence of [`LogEntry`] values that
//! clients read by trailing count. Producers call [`LogStore::record`] (or
//! [`LogStore::append`] with a prepared entry); the HTTP layer exposes
//! [`LogStore::tail`] and [`LogStore::clear`].

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Number of entries returned when a caller gives no usable limit
pub const DEFAULT_TAIL_LIMIT: usize = 100;

/// Wire format for entry timestamps (local time, millisecond precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    /// A processing step finished successfully
    Success,
    #[serde(alias = "WARNING")]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Lenient parse used by renderers; accepts any case and `WARNING`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "SUCCESS" => Some(LogLevel::Success),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single timestamped event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Local>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
            data: Map::new(),
        }
    }

    /// Attach a structured payload. Non-object values are stored under `"value"`.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = into_payload(data);
        self
    }
}

fn into_payload(data: Value) -> Map<String, Value> {
    match data {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

mod timestamp_format {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Local>, D::Error> {
        let raw = String::deserialize(d)?;
        let naive = NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
            .map_err(serde::de::Error::custom)?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| serde::de::Error::custom(format!("nonexistent local time: {raw}")))
    }
}

/// Parse a `limit` query value; anything but a positive integer yields the default
pub fn parse_limit(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

/// Append-only JSON-lines mirror of the store. Best effort only.
struct Journal {
    path: PathBuf,
    failing: AtomicBool,
}

impl Journal {
    fn write(&self, entry: &LogEntry) {
        let result = serde_json::to_string(entry)
            .map_err(std::io::Error::other)
            .and_then(|line| {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?;
                writeln!(file, "{line}")
            });

        match result {
            Ok(()) => {
                if self.failing.swap(false, Ordering::Relaxed) {
                    info!(path = %self.path.display(), "Log journal writable again");
                }
            }
            Err(e) => {
                // Only the first failure of a streak is reported
                if !self.failing.swap(true, Ordering::Relaxed) {
                    warn!(path = %self.path.display(), error = %e, "Failed to write log journal");
                }
            }
        }
    }
}

/// Ordered, clearable event log shared by all request handlers
pub struct LogStore {
    entries: Mutex<VecDeque<LogEntry>>,
    max_entries: Option<usize>,
    journal: Option<Journal>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStore {
    /// Create an empty, unbounded store
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries: None,
            journal: None,
        }
    }

    /// Keep at most `max` entries, dropping the oldest first
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max.max(1));
        self
    }

    /// Mirror every appended entry to a JSON-lines file
    pub fn with_journal(mut self, path: impl AsRef<Path>) -> Self {
        self.journal = Some(Journal {
            path: path.as_ref().to_path_buf(),
            failing: AtomicBool::new(false),
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        // A panicking producer must not take the log down with it
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_locked(&self, entries: &mut VecDeque<LogEntry>, entry: LogEntry) {
        if let Some(journal) = &self.journal {
            journal.write(&entry);
        }
        entries.push_back(entry);
        if let Some(max) = self.max_entries {
            while entries.len() > max {
                entries.pop_front();
            }
        }
    }

    /// Append a prepared entry to the end of the log
    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.lock();
        self.push_locked(&mut entries, entry);
    }

    /// Stamp, store and mirror an event.
    ///
    /// The timestamp is taken under the store lock and never precedes the
    /// previous entry's, so concurrent producers see a non-decreasing log.
    pub fn record(&self, level: LogLevel, message: impl Into<String>, data: Value) {
        let message = message.into();
        mirror(level, &message);

        let mut entries = self.lock();
        let now = Local::now();
        let timestamp = match entries.back() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        let entry = LogEntry {
            timestamp,
            level,
            message,
            data: into_payload(data),
        };
        self.push_locked(&mut entries, entry);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(LogLevel::Info, message, Value::Null);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.record(LogLevel::Success, message, Value::Null);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(LogLevel::Warn, message, Value::Null);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(LogLevel::Error, message, Value::Null);
    }

    /// The last `limit` entries in chronological order
    pub fn tail(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Drop every entry. Idempotent.
    pub fn clear(&self) {
        let removed = {
            let mut entries = self.lock();
            let removed = entries.len();
            entries.clear();
            removed
        };
        info!(removed, "Logs cleared");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn mirror(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => debug!(target: "tailgate::events", "{message}"),
        LogLevel::Info | LogLevel::Success => {
            info!(target: "tailgate::events", level = %level, "{message}")
        }
        LogLevel::Warn => warn!(target: "tailgate::events", "{message}"),
        LogLevel::Error => error!(target: "tailgate::events", "{message}"),
    }
}
