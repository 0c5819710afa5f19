use std::{sync::Arc, time::Duration};

use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};
use rand::{rngs::SmallRng, SeedableRng};
use serde_json::json;
use shared_logging::LogLevel;
use tracing::{debug, error, info};

use super::metrics::{AutonomyMetrics, PingTracker};
use crate::{
    actor::ActorId,
    config::AutonomyConfig,
    mode::ScoringOutput,
    request::{AutonomyRequest, DecisionResult, RandomizationOverride},
    scored::InteractionHandle,
    selection::{select_interaction, SelectionParams},
    telemetry::AutonomyTelemetry,
};

/// Observer of decisions, used by automated load tests.
pub trait AutomationHook: Send + Sync {
    /// A decision cycle produced `chosen` for `actor_id`.
    fn on_decision(&self, actor_id: ActorId, chosen: Option<&InteractionHandle>) {
        let _ = (actor_id, chosen);
    }

    /// The scheduler finished with `actor_id`'s request, whatever the outcome.
    fn on_cycle_finished(&self, actor_id: ActorId) {
        let _ = actor_id;
    }
}

/// Runs one decision cycle: scoring, selection, archiving and metrics.
/// Shared by the scheduler and the inline path of the service.
pub struct DecisionEngine {
    config: AutonomyConfig,
    rng: Mutex<SmallRng>,
    telemetry: Option<AutonomyTelemetry>,
    hook: Option<Arc<dyn AutomationHook>>,
    metrics: RwLock<AutonomyMetrics>,
    ping: Mutex<PingTracker>,
    randomization_override: RwLock<RandomizationOverride>,
    log_next: Mutex<IndexSet<ActorId>>,
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("num_interactions", &self.config.num_interactions)
            .field("archive", &self.config.archive)
            .field("randomization_override", &*self.randomization_override.read())
            .finish_non_exhaustive()
    }
}

impl DecisionEngine {
    /// Creates an engine. The selection RNG is seeded from `rng_seed` when
    /// set, otherwise from entropy.
    #[must_use]
    pub fn new(
        config: AutonomyConfig,
        telemetry: Option<AutonomyTelemetry>,
        hook: Option<Arc<dyn AutomationHook>>,
    ) -> Self {
        let rng = config
            .rng_seed
            .map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64);
        let ping = PingTracker::new(config.ping_window);
        Self {
            config,
            rng: Mutex::new(rng),
            telemetry,
            hook,
            metrics: RwLock::new(AutonomyMetrics::default()),
            ping: Mutex::new(ping),
            randomization_override: RwLock::new(RandomizationOverride::Inherit),
            log_next: Mutex::new(IndexSet::new()),
        }
    }

    /// Configuration the engine runs with.
    #[must_use]
    pub const fn config(&self) -> &AutonomyConfig {
        &self.config
    }

    /// Telemetry handle, if any.
    #[must_use]
    pub const fn telemetry(&self) -> Option<&AutonomyTelemetry> {
        self.telemetry.as_ref()
    }

    /// Automation hook, if any.
    #[must_use]
    pub fn hook(&self) -> Option<&Arc<dyn AutomationHook>> {
        self.hook.as_ref()
    }

    /// Sets the override applied to requests that did not pick one.
    pub fn set_randomization_override(&self, randomization: RandomizationOverride) {
        *self.randomization_override.write() = randomization;
    }

    /// Current global randomization override.
    #[must_use]
    pub fn randomization_override(&self) -> RandomizationOverride {
        *self.randomization_override.read()
    }

    /// Archives and logs the next decision made for `actor_id`.
    pub fn log_next_decision(&self, actor_id: ActorId) {
        self.log_next.lock().insert(actor_id);
    }

    /// Actors whose next decision will be logged.
    #[must_use]
    pub fn pending_decision_logs(&self) -> Vec<ActorId> {
        self.log_next.lock().iter().copied().collect()
    }

    /// Metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> AutonomyMetrics {
        self.metrics.read().clone()
    }

    pub(crate) fn update_metrics(&self, update: impl FnOnce(&mut AutonomyMetrics)) {
        let mut metrics = self.metrics.write();
        update(&mut metrics);
        metrics.updated_at = chrono::Utc::now();
    }

    /// Scores and selects for `request`. An actor that disappears before or
    /// during scoring yields no action; an exit raised by the scorer is
    /// swallowed as no action. The request's suspension is left untouched.
    pub fn decide(&self, request: &mut AutonomyRequest, time_slice: Option<Duration>) -> DecisionResult {
        let actor_id = request.actor_id();
        let log_this = self.log_next.lock().shift_remove(&actor_id);
        request.inherit_randomization(self.randomization_override());
        request.default_archive(self.config.archive || log_this);

        if !request.actor().is_alive() {
            debug!(actor = actor_id, "actor gone before scoring; abandoning request");
            self.update_metrics(|m| m.abandoned += 1);
            return Ok(None);
        }

        let mode = request.mode();
        let scored = match mode.score_all_interactions(request, time_slice) {
            Ok(ScoringOutput::Scored(scored)) => scored,
            Ok(ScoringOutput::Malformed(reason)) => {
                error!(actor = actor_id, mode = mode.name(), %reason, "scoring returned a malformed result");
                self.update_metrics(|m| m.no_action += 1);
                return Ok(None);
            }
            Err(err) if err.is_exit() => {
                debug!(actor = actor_id, %err, "exit raised during scoring");
                self.update_metrics(|m| m.no_action += 1);
                return Ok(None);
            }
            Err(err) => {
                self.update_metrics(|m| m.errors += 1);
                return Err(err);
            }
        };

        let Some(actor) = request.actor().upgrade() else {
            debug!(actor = actor_id, "actor gone after scoring; abandoning request");
            self.update_metrics(|m| m.abandoned += 1);
            request.set_valid_interactions(scored);
            request.invalidate_created_interactions(None);
            return Ok(None);
        };

        request.set_valid_interactions(scored);
        let params = SelectionParams::for_request(request, self.config.num_interactions);
        let chosen = {
            let mut rng = self.rng.lock();
            select_interaction(request, actor.as_ref(), params, &mut *rng)
        };
        request.set_chosen(chosen.clone());

        self.publish_archive(request, log_this);
        if let Some(hook) = &self.hook {
            hook.on_decision(actor_id, chosen.as_ref());
        }
        self.update_metrics(|m| {
            if chosen.is_some() {
                m.chosen += 1;
            } else {
                m.no_action += 1;
            }
        });
        Ok(chosen)
    }

    /// Records the request's latency and wakes its caller.
    pub fn finish(&self, request: &mut AutonomyRequest, result: DecisionResult) {
        let waited = request.waited();
        let (avg, max) = {
            let mut ping = self.ping.lock();
            ping.record(waited);
            (ping.average(), ping.max())
        };
        self.update_metrics(|m| {
            m.processed += 1;
            m.avg_ping_ms = avg.as_secs_f64() * 1_000.0;
            m.max_ping_ms = max.as_secs_f64() * 1_000.0;
        });
        request.release(result);
    }

    fn publish_archive(&self, request: &AutonomyRequest, log_this: bool) {
        for record in request.selection_archive() {
            let Ok(payload) = serde_json::to_value(record) else {
                continue;
            };
            if log_this {
                info!(actor = record.actor_id, record = %payload, "logged autonomy decision");
            }
            if let Some(tel) = &self.telemetry {
                let _ = tel.log(LogLevel::Debug, "autonomy.selection.archived", payload.clone());
                let _ = tel.event("autonomy.selection.archived", payload);
            }
        }
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Info,
                "autonomy.decision",
                json!({
                    "request": request.id(),
                    "actor": request.actor_id(),
                    "chosen": request.chosen().map(|c| c.kind().to_owned()),
                    "candidates": request.valid_interactions().len(),
                }),
            );
        }
    }
}
