//! Public decision service: queued and inline decisions plus the debug
//! surface used by the console.

/// Text debug commands.
pub mod console;
/// Builder utilities for the service.
pub mod maker;

use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::info;

use maker::AutonomyServiceBuilder;

use crate::{
    actor::{ActorId, ActorRef},
    clock::SimClock,
    config::AutonomyConfig,
    error::AutonomyError,
    mode::AutonomyMode,
    request::{AutonomyRequest, DecisionHandle, DecisionOptions, DecisionResult, RandomizationOverride},
    scheduler::{
        AutomationHook, AutonomyMetrics, CooperativeScheduler, CounterSink, DecisionEngine,
        PassReport, SchedulerState,
    },
    telemetry::AutonomyTelemetry,
};

/// Entry point for decision requests. One per simulation.
#[derive(Debug)]
pub struct AutonomyService {
    scheduler: CooperativeScheduler,
    clock: SimClock,
    locked_decays: RwLock<IndexSet<String>>,
}

impl AutonomyService {
    /// Creates a service. Prefer [`AutonomyService::builder`].
    #[must_use]
    pub fn new(
        config: AutonomyConfig,
        clock: SimClock,
        counters: Arc<dyn CounterSink>,
        telemetry: Option<AutonomyTelemetry>,
        hook: Option<Arc<dyn AutomationHook>>,
    ) -> Self {
        let engine = Arc::new(DecisionEngine::new(config, telemetry, hook));
        Self {
            scheduler: CooperativeScheduler::new(engine, clock.clone(), counters),
            clock,
            locked_decays: RwLock::new(IndexSet::new()),
        }
    }

    /// Returns a builder for the service.
    #[must_use]
    pub fn builder() -> AutonomyServiceBuilder {
        AutonomyServiceBuilder::new()
    }

    /// Simulation clock driving the scheduler.
    #[must_use]
    pub const fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Queues a decision for `actor` scored by `mode`.
    pub fn enqueue_decision(
        &self,
        actor: ActorRef,
        mode: Arc<dyn AutonomyMode>,
        options: DecisionOptions,
    ) -> Result<DecisionHandle, AutonomyError> {
        self.enqueue(AutonomyRequest::new(actor, mode).with_options(options))
    }

    /// Queues a prepared request.
    pub fn enqueue(&self, request: AutonomyRequest) -> Result<DecisionHandle, AutonomyError> {
        self.scheduler.enqueue(request)
    }

    /// Queues `request` and waits for its outcome.
    pub async fn find_best_action_gen(&self, request: AutonomyRequest) -> DecisionResult {
        self.enqueue(request)?.outcome().await
    }

    /// Scores and selects inline, bypassing the queue and the time slice.
    pub fn find_best_action(&self, mut request: AutonomyRequest) -> DecisionResult {
        self.scheduler.engine().decide(&mut request, None)
    }

    /// Hard-stops the processor. Queued requests are kept.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Scheduler state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Pending request count.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.scheduler.queue_depth()
    }

    /// Pending actors in queue order.
    #[must_use]
    pub fn queued_actor_ids(&self) -> Vec<ActorId> {
        self.scheduler.queued_actor_ids()
    }

    /// Actor currently being processed.
    #[must_use]
    pub fn active_actor(&self) -> Option<ActorId> {
        self.scheduler.active_actor()
    }

    /// Metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> AutonomyMetrics {
        self.scheduler.engine().metrics()
    }

    /// Receiver of per-pass reports.
    #[must_use]
    pub fn subscribe_passes(&self) -> watch::Receiver<PassReport> {
        self.scheduler.subscribe_passes()
    }

    /// Archives and logs the next decision made for `actor_id`.
    pub fn log_next_decision(&self, actor_id: ActorId) {
        info!(actor = actor_id, "next autonomy decision will be logged");
        self.scheduler.engine().log_next_decision(actor_id);
    }

    /// Forces randomization on or off for requests that did not choose,
    /// or returns control to actor settings with `Inherit`.
    pub fn set_randomization_override(&self, randomization: RandomizationOverride) {
        info!(?randomization, "autonomy randomization override changed");
        self.scheduler.engine().set_randomization_override(randomization);
    }

    /// Global randomization override.
    #[must_use]
    pub fn randomization_override(&self) -> RandomizationOverride {
        self.scheduler.engine().randomization_override()
    }

    /// Freezes decay of `stat`. Returns `false` if it was already locked.
    pub fn lock_decay(&self, stat: &str) -> bool {
        self.locked_decays.write().insert(stat.to_owned())
    }

    /// Resumes decay of `stat`. Returns `false` if it was not locked.
    pub fn unlock_decay(&self, stat: &str) -> bool {
        self.locked_decays.write().shift_remove(stat)
    }

    /// Whether decay of `stat` is frozen.
    #[must_use]
    pub fn is_decay_locked(&self, stat: &str) -> bool {
        self.locked_decays.read().contains(stat)
    }

    /// Frozen stats in lock order.
    #[must_use]
    pub fn locked_decays(&self) -> Vec<String> {
        self.locked_decays.read().iter().cloned().collect()
    }
}

impl Drop for AutonomyService {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        actor::{AutonomyRandomization, SimActor},
        mode::{CandidateSpec, StaticMode},
        request::RequestContext,
        scheduler::MemoryCounters,
    };

    #[derive(Default)]
    struct FinishedHook {
        finished: AtomicUsize,
    }

    impl AutomationHook for FinishedHook {
        fn on_cycle_finished(&self, _actor_id: ActorId) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn deterministic(id: ActorId, name: &str) -> Arc<SimActor> {
        Arc::new(SimActor::new(id, name).with_randomization(AutonomyRandomization::Disabled))
    }

    #[tokio::test]
    async fn three_actor_pass_end_to_end() {
        let counters = Arc::new(MemoryCounters::new());
        let hook = Arc::new(FinishedHook::default());
        let service = AutonomyService::builder()
            .counters(counters.clone())
            .hook(hook.clone())
            .rng_seed(1)
            .build()
            .unwrap();
        let a = deterministic(1, "A");
        let b = deterministic(2, "B");
        let c = deterministic(3, "C");
        let mode: Arc<dyn AutonomyMode> = Arc::new(
            StaticMode::default()
                .with_candidates(
                    1,
                    vec![
                        CandidateSpec::new("eat", Some(10), 3.0),
                        CandidateSpec::new("sleep", Some(11), 1.0),
                    ],
                )
                .with_candidates(
                    3,
                    vec![
                        CandidateSpec::new("mope", Some(30), -1.0),
                        CandidateSpec::new("sulk", Some(31), -2.0),
                    ],
                ),
        );
        let mut reports = service.subscribe_passes();
        let ha = service
            .enqueue_decision(ActorRef::new(&a), mode.clone(), DecisionOptions::default())
            .unwrap();
        let hb = service
            .enqueue_decision(ActorRef::new(&b), mode.clone(), DecisionOptions::default())
            .unwrap();
        let hc = service
            .enqueue_decision(ActorRef::new(&c), mode, DecisionOptions::default())
            .unwrap();
        assert_eq!(service.queued_actor_ids(), vec![1, 2, 3]);

        reports.changed().await.unwrap();
        let report = reports.borrow().clone();
        assert_eq!(report.pass, 1);
        assert_eq!(report.processed, 3);
        assert_eq!(report.remaining, 0);

        assert_eq!(ha.outcome().await.unwrap().unwrap().kind(), "eat");
        assert!(hb.outcome().await.unwrap().is_none());
        assert!(hc.outcome().await.unwrap().is_none());
        assert_eq!(service.queue_depth(), 0);
        assert_eq!(counters.get("autonomy_queue_length"), Some(0));
        assert_eq!(hook.finished.load(Ordering::SeqCst), 3);
        assert_eq!(service.active_actor(), None);

        let metrics = service.metrics();
        assert_eq!(metrics.processed, 3);
        assert_eq!(metrics.chosen, 1);
        assert_eq!(metrics.no_action, 2);
        assert_eq!(metrics.passes, 1);
    }

    #[tokio::test]
    async fn queued_and_inline_paths_agree() {
        let service = AutonomyService::builder().rng_seed(4).build().unwrap();
        let actor = deterministic(5, "Inline");
        let mode: Arc<dyn AutonomyMode> = Arc::new(StaticMode::default().with_candidates(
            5,
            vec![
                CandidateSpec::new("garden", Some(1), 2.0),
                CandidateSpec::new("read", Some(2), 5.0),
            ],
        ));
        let inline = service
            .find_best_action(AutonomyRequest::new(ActorRef::new(&actor), mode.clone()))
            .unwrap()
            .unwrap();
        let queued = service
            .find_best_action_gen(AutonomyRequest::new(ActorRef::new(&actor), mode))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inline.kind(), "read");
        assert_eq!(queued.kind(), "read");
    }

    #[tokio::test]
    async fn global_override_yields_to_request_override() {
        let service = AutonomyService::builder().rng_seed(9).build().unwrap();
        service.set_randomization_override(RandomizationOverride::Enabled);
        assert_eq!(service.randomization_override(), RandomizationOverride::Enabled);

        let actor = deterministic(6, "Picky");
        let mode: Arc<dyn AutonomyMode> = Arc::new(StaticMode::default().with_candidates(
            6,
            vec![
                CandidateSpec::new("low", Some(1), 1.0),
                CandidateSpec::new("high", Some(2), 1_000.0),
            ],
        ));
        let options = DecisionOptions {
            context: RequestContext::autonomous().with_randomization(RandomizationOverride::Disabled),
            ..DecisionOptions::default()
        };
        for _ in 0..20 {
            let chosen = service
                .find_best_action(
                    AutonomyRequest::new(ActorRef::new(&actor), mode.clone()).with_options(options),
                )
                .unwrap()
                .unwrap();
            assert_eq!(chosen.kind(), "high");
        }
    }

    #[test]
    fn decay_locks_toggle() {
        let service = AutonomyService::builder().build().unwrap();
        assert!(service.lock_decay("hunger"));
        assert!(!service.lock_decay("hunger"));
        assert!(service.lock_decay("energy"));
        assert!(service.is_decay_locked("hunger"));
        assert_eq!(service.locked_decays(), vec!["hunger", "energy"]);
        assert!(service.unlock_decay("hunger"));
        assert!(!service.unlock_decay("hunger"));
        assert_eq!(service.locked_decays(), vec!["energy"]);
    }

    #[tokio::test]
    async fn vanished_actor_is_refused_at_enqueue() {
        let service = AutonomyService::builder().build().unwrap();
        let actor = deterministic(12, "Gone");
        let actor_ref = ActorRef::new(&actor);
        drop(actor);
        let err = service
            .enqueue_decision(actor_ref, Arc::new(StaticMode::default()), DecisionOptions::default())
            .unwrap_err();
        assert_eq!(err, AutonomyError::ActorUnavailable(12));
        assert_eq!(service.queue_depth(), 0);
    }

    #[test]
    fn enqueue_outside_runtime_is_an_error() {
        let service = AutonomyService::builder().build().unwrap();
        let actor = deterministic(1, "NoRuntime");
        let err = service
            .enqueue_decision(
                ActorRef::new(&actor),
                Arc::new(StaticMode::default()),
                DecisionOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, AutonomyError::Internal(_)));
    }
}
