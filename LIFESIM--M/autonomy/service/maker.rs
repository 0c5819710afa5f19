use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    clock::SimClock,
    config::AutonomyConfig,
    scheduler::{AutomationHook, CounterSink, MemoryCounters},
    telemetry::AutonomyTelemetry,
};

use super::AutonomyService;

/// Builder used to configure an [`AutonomyService`].
pub struct AutonomyServiceBuilder {
    config: AutonomyConfig,
    clock: Option<SimClock>,
    counters: Option<Arc<dyn CounterSink>>,
    telemetry: Option<AutonomyTelemetry>,
    hook: Option<Arc<dyn AutomationHook>>,
}

impl Default for AutonomyServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AutonomyServiceBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AutonomyConfig::default(),
            clock: None,
            counters: None,
            telemetry: None,
            hook: None,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: AutonomyConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing simulation clock.
    #[must_use]
    pub fn clock(mut self, clock: SimClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sends queue depth reports to `counters`.
    #[must_use]
    pub fn counters(mut self, counters: Arc<dyn CounterSink>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn telemetry(mut self, telemetry: AutonomyTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Attaches an automation hook.
    #[must_use]
    pub fn hook(mut self, hook: Arc<dyn AutomationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Overrides the selection RNG seed.
    #[must_use]
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    /// Validates the configuration and builds the service.
    pub fn build(self) -> Result<AutonomyService> {
        self.config
            .validate()
            .context("invalid autonomy configuration")?;
        Ok(AutonomyService::new(
            self.config,
            self.clock.unwrap_or_default(),
            self.counters
                .unwrap_or_else(|| Arc::new(MemoryCounters::new())),
            self.telemetry,
            self.hook,
        ))
    }
}
