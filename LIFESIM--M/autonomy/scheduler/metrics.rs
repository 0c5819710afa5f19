use std::{collections::VecDeque, time::Duration};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Rolling average of how long requests waited from enqueue to release.
#[derive(Debug, Clone)]
pub struct PingTracker {
    history: VecDeque<Duration>,
    capacity: usize,
}

impl Default for PingTracker {
    fn default() -> Self {
        Self::new(32)
    }
}

impl PingTracker {
    /// Tracker averaging the last `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Records one request latency.
    pub fn record(&mut self, sample: Duration) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample);
    }

    /// Average over the window, zero when empty.
    #[must_use]
    pub fn average(&self) -> Duration {
        let Ok(count) = u32::try_from(self.history.len()) else {
            return Duration::ZERO;
        };
        if count == 0 {
            return Duration::ZERO;
        }
        self.history.iter().sum::<Duration>() / count
    }

    /// Longest latency in the window.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.history.iter().max().copied().unwrap_or_default()
    }
}

/// Scheduler and selection counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutonomyMetrics {
    /// Scheduler passes run since start.
    pub passes: u64,
    /// Requests fully processed.
    pub processed: u64,
    /// Requests that ended with an interaction.
    pub chosen: u64,
    /// Requests that ended with no interaction.
    pub no_action: u64,
    /// Requests whose actor disappeared before processing finished.
    pub abandoned: u64,
    /// Requests that failed with an error other than an exit.
    pub errors: u64,
    /// Passes that stopped early on the time budget.
    pub budget_exhaustions: u64,
    /// Average enqueue-to-release latency over the ping window, in milliseconds.
    pub avg_ping_ms: f64,
    /// Longest enqueue-to-release latency over the ping window, in milliseconds.
    pub max_ping_ms: f64,
    /// Wall-clock duration of the last pass, in milliseconds.
    pub last_pass_ms: f64,
    /// Queue depth at the last report.
    pub queue_depth: usize,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Default for AutonomyMetrics {
    fn default() -> Self {
        Self {
            passes: 0,
            processed: 0,
            chosen: 0,
            no_action: 0,
            abandoned: 0,
            errors: 0,
            budget_exhaustions: 0,
            avg_ping_ms: 0.0,
            max_ping_ms: 0.0,
            last_pass_ms: 0.0,
            queue_depth: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Destination of named counter reports.
pub trait CounterSink: Send + Sync {
    /// Sets `name` to `value`.
    fn report(&self, name: &str, value: u64);
}

/// Counter sink holding the latest value of every counter.
#[derive(Debug, Default)]
pub struct MemoryCounters {
    values: RwLock<IndexMap<String, u64>>,
}

impl MemoryCounters {
    /// Creates an empty counter table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.read().get(name).copied()
    }

    /// Every counter in first-report order.
    #[must_use]
    pub fn snapshot(&self) -> IndexMap<String, u64> {
        self.values.read().clone()
    }
}

impl CounterSink for MemoryCounters {
    fn report(&self, name: &str, value: u64) {
        self.values.write().insert(name.to_owned(), value);
    }
}
