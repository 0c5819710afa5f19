#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging shared by the simulation services.
//!
//! Services emit [`LogRecord`]s into a [`LogSink`]. Production builds append
//! to a file through [`JsonLogger`]; tests and debug consoles usually keep
//! the records in a bounded [`MemoryLogSink`].

use std::{
    collections::VecDeque,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Recoverable anomaly.
    Warn,
    /// Failure that cost an actor its decision.
    Error,
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Wall-clock time the record was produced.
    pub timestamp: DateTime<Utc>,
    /// Service emitting the record.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Dotted message key, e.g. `autonomy.pass.completed`.
    pub message: String,
    /// Simulation tick the record belongs to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<u64>,
    /// Arbitrary JSON fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            tick: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Attaches the simulation tick.
    #[must_use]
    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Merges the fields of a JSON object into the metadata. Non-object
    /// values are stored under `value`.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        match metadata {
            serde_json::Value::Object(map) => self.metadata.extend(map),
            serde_json::Value::Null => {}
            other => {
                self.metadata.insert("value".into(), other);
            }
        }
        self
    }
}

/// Destination for structured records.
pub trait LogSink: Send + Sync {
    /// Writes one record.
    fn write(&self, record: &LogRecord) -> Result<()>;
}

/// Append-only JSON-lines file logger.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at `path`, creating parent directories.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonLogger {
    fn write(&self, record: &LogRecord) -> Result<()> {
        let line = serde_json::to_vec(record)?;
        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Bounded in-memory sink; the oldest record is evicted when full.
#[derive(Debug)]
pub struct MemoryLogSink {
    capacity: usize,
    records: Mutex<VecDeque<LogRecord>>,
}

impl MemoryLogSink {
    /// Creates a sink retaining at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Copies the retained records, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Retained records whose message equals `message`.
    #[must_use]
    pub fn find(&self, message: &str) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.message == message)
            .cloned()
            .collect()
    }
}

impl LogSink for MemoryLogSink {
    fn write(&self, record: &LogRecord) -> Result<()> {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn json_logger_appends_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("nested/autonomy.log")).unwrap();
        logger
            .write(&LogRecord::new("autonomy", LogLevel::Info, "autonomy.pass.completed").with_tick(7))
            .unwrap();
        logger
            .write(&LogRecord::new("autonomy", LogLevel::Warn, "autonomy.cache.miss"))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"tick\":7"));
        assert!(lines[1].contains("\"level\":\"WARN\""));
    }

    #[test]
    fn memory_sink_evicts_oldest() {
        let sink = MemoryLogSink::new(2);
        for name in ["a", "b", "c"] {
            sink.write(&LogRecord::new("test", LogLevel::Debug, name)).unwrap();
        }
        let kept: Vec<_> = sink.snapshot().into_iter().map(|r| r.message).collect();
        assert_eq!(kept, vec!["b", "c"]);
    }

    #[test]
    fn metadata_merges_objects() {
        let record = LogRecord::new("test", LogLevel::Info, "m")
            .with_metadata(json!({ "actor": 4 }))
            .with_metadata(json!(12));
        assert_eq!(record.metadata["actor"], json!(4));
        assert_eq!(record.metadata["value"], json!(12));
    }
}
