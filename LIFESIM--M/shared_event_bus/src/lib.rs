#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Event bus used by simulation services to publish debug and archive
//! events (decision archives, queue depth samples, pass reports).

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

/// Event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier.
    pub id: String,
    /// Service producing the event.
    pub source: String,
    /// Dotted event type, e.g. `autonomy.selection.archived`.
    pub event_type: String,
    /// Simulation tick at publication, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<u64>,
    /// RFC 3339 wall-clock timestamp.
    pub timestamp: String,
    /// Event body.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Publishing half of the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: EventRecord) -> Result<()>;
}

/// In-process bus keeping a bounded backlog for inspection by debug
/// commands.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    capacity: usize,
    backlog: Arc<Mutex<VecDeque<EventRecord>>>,
}

impl MemoryEventBus {
    /// Creates a bus whose backlog holds `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Recent events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.backlog.lock().iter().cloned().collect()
    }

    /// Recent events of one type, oldest first.
    #[must_use]
    pub fn of_type(&self, event_type: &str) -> Vec<EventRecord> {
        self.backlog
            .lock()
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        let mut backlog = self.backlog.lock();
        if backlog.len() == self.capacity {
            backlog.pop_front();
        }
        backlog.push_back(event);
        Ok(())
    }
}

/// Publisher appending events as JSON lines to a file.
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Creates the publisher, creating parent directories of `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Destination file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventPublisher for FileEventPublisher {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        let mut data = serde_json::to_vec(&event)?;
        data.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }
}
