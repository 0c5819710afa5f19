use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use tokio::runtime::Handle;
use uuid::Uuid;

/// Builder for autonomy telemetry sinks.
pub struct AutonomyTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    log_sink: Option<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl AutonomyTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            log_sink: None,
            event_publisher: None,
        }
    }

    /// Writes JSON-lines records to `path`.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Writes records to an existing sink. Takes precedence over
    /// [`Self::log_path`].
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<AutonomyTelemetry> {
        let sink: Option<Arc<dyn LogSink>> = match (self.log_sink, self.log_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => Some(Arc::new(JsonLogger::new(path)?)),
            (None, None) => None,
        };
        Ok(AutonomyTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                sink,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared by the scheduler and the service.
#[derive(Clone)]
pub struct AutonomyTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for AutonomyTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutonomyTelemetry")
            .field("module", &self.inner.module)
            .field("logs", &self.inner.sink.is_some())
            .field("events", &self.inner.publisher.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    sink: Option<Arc<dyn LogSink>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl AutonomyTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> AutonomyTelemetryBuilder {
        AutonomyTelemetryBuilder::new(module)
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        self.write(LogRecord::new(&self.inner.module, level, message).with_metadata(metadata))
    }

    /// Logs structured metadata stamped with a simulation tick.
    pub fn log_at(&self, tick: u64, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        self.write(
            LogRecord::new(&self.inner.module, level, message)
                .with_tick(tick)
                .with_metadata(metadata),
        )
    }

    fn write(&self, record: LogRecord) -> Result<()> {
        if let Some(sink) = &self.inner.sink {
            sink.write(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus. Inside a runtime the publish is spawned;
    /// outside one it completes before returning.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        let Some(publisher) = &self.inner.publisher else {
            return Ok(());
        };
        let record = EventRecord {
            id: format!("evt-{}", Uuid::new_v4()),
            source: self.inner.module.clone(),
            event_type: event_type.into(),
            tick: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            payload,
        };
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    tracing::warn!(?err, "telemetry event publish failed");
                }
            });
            Ok(())
        } else {
            futures::executor::block_on(publisher.publish(record))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use shared_logging::MemoryLogSink;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("autonomy.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = AutonomyTelemetry::builder("autonomy")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "autonomy.pass", json!({ "processed": 3 }))
            .unwrap();
        telemetry
            .event("autonomy.decision", json!({ "actor": 7 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("autonomy.pass"));
        assert_eq!(bus.of_type("autonomy.decision").len(), 1);
    }

    #[test]
    fn memory_sink_takes_precedence() {
        let sink = Arc::new(MemoryLogSink::new(8));
        let telemetry = AutonomyTelemetry::builder("autonomy")
            .log_sink(sink.clone())
            .build()
            .unwrap();
        telemetry
            .log_at(12, LogLevel::Warn, "autonomy.miss", json!({ "kind": "eat" }))
            .unwrap();
        let records = sink.find("autonomy.miss");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tick, Some(12));
    }
}
