//! Cooperative, time-sliced processing of queued decision requests.

/// Decision engine shared by the scheduler and inline decisions.
pub mod cycle;
/// Latency window, counters and metrics snapshot.
pub mod metrics;

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
use tracing::{debug, error, instrument};

pub use cycle::{AutomationHook, DecisionEngine};
pub use metrics::{AutonomyMetrics, CounterSink, MemoryCounters, PingTracker};

use crate::{
    actor::ActorId,
    clock::SimClock,
    error::AutonomyError,
    queue::AutonomyQueue,
    request::{AutonomyRequest, DecisionHandle},
};

/// Lifecycle of the processor task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// No processor running.
    Idle,
    /// A pass is consuming the queue.
    Draining,
    /// Waiting for the next simulation tick.
    Sleeping,
    /// Hard-stopped; the queue is retained.
    Stopped,
}

/// Summary of one scheduler pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassReport {
    /// Pass number, starting at 1.
    pub pass: u64,
    /// Requests processed in the pass.
    pub processed: usize,
    /// Requests left in the queue afterwards.
    pub remaining: usize,
    /// Wall-clock time the pass took.
    pub elapsed: Duration,
    /// Whether the pass stopped on its time slice.
    pub budget_exhausted: bool,
}

struct QueueState {
    queue: AutonomyQueue,
    state: SchedulerState,
    active_actor: Option<ActorId>,
    processor: Option<JoinHandle<()>>,
    generation: u64,
    passes: u64,
}

struct Shared {
    engine: Arc<DecisionEngine>,
    clock: SimClock,
    counters: Arc<dyn CounterSink>,
    time_slice: Duration,
    inner: Mutex<QueueState>,
    reports: watch::Sender<PassReport>,
}

/// Owns the request queue and the processor task that drains it once
/// per simulation tick within a wall-clock slice.
#[derive(Clone)]
pub struct CooperativeScheduler {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for CooperativeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("CooperativeScheduler")
            .field("state", &inner.state)
            .field("queued", &inner.queue.len())
            .field("active_actor", &inner.active_actor)
            .field("time_slice", &self.shared.time_slice)
            .finish()
    }
}

impl CooperativeScheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new(engine: Arc<DecisionEngine>, clock: SimClock, counters: Arc<dyn CounterSink>) -> Self {
        let time_slice = engine.config().time_slice();
        let (reports, _) = watch::channel(PassReport::default());
        Self {
            shared: Arc::new(Shared {
                engine,
                clock,
                counters,
                time_slice,
                inner: Mutex::new(QueueState {
                    queue: AutonomyQueue::new(),
                    state: SchedulerState::Idle,
                    active_actor: None,
                    processor: None,
                    generation: 0,
                    passes: 0,
                }),
                reports,
            }),
        }
    }

    /// Queues `request` and returns the caller's handle. Starts a processor
    /// when none is alive. Must be called inside a tokio runtime; requests
    /// for actors that no longer exist are refused.
    pub fn enqueue(&self, mut request: AutonomyRequest) -> Result<DecisionHandle, AutonomyError> {
        let runtime = Handle::try_current()
            .map_err(|_| AutonomyError::Internal("enqueue outside a tokio runtime".into()))?;
        if !request.actor().is_alive() {
            return Err(AutonomyError::ActorUnavailable(request.actor_id()));
        }
        let handle = request.attach_suspension();
        request.mark_enqueued();
        let actor_id = request.actor_id();

        let mut inner = self.shared.inner.lock();
        inner.queue.push_back(request)?;
        debug!(actor = actor_id, queued = inner.queue.len(), "autonomy request queued");
        if inner.processor.as_ref().is_none_or(JoinHandle::is_finished) {
            inner.generation += 1;
            inner.state = SchedulerState::Draining;
            let generation = inner.generation;
            let shared = Arc::clone(&self.shared);
            inner.processor = Some(runtime.spawn(shared.run(generation)));
        }
        Ok(handle)
    }

    /// Aborts the processor. A request already being scored finishes and
    /// is released; queued requests stay queued and the next enqueue starts
    /// a fresh processor.
    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        inner.generation += 1;
        if let Some(processor) = inner.processor.take() {
            processor.abort();
        }
        inner.state = SchedulerState::Stopped;
        inner.active_actor = None;
        debug!(queued = inner.queue.len(), "autonomy scheduler stopped");
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.shared.inner.lock().state
    }

    /// Pending request count.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Actor ids of pending requests, in queue order.
    #[must_use]
    pub fn queued_actor_ids(&self) -> Vec<ActorId> {
        self.shared.inner.lock().queue.queued_actor_ids()
    }

    /// Actor whose request is being processed right now.
    #[must_use]
    pub fn active_actor(&self) -> Option<ActorId> {
        self.shared.inner.lock().active_actor
    }

    /// Receiver of pass reports.
    #[must_use]
    pub fn subscribe_passes(&self) -> watch::Receiver<PassReport> {
        self.shared.reports.subscribe()
    }

    /// Engine the scheduler processes requests with.
    #[must_use]
    pub fn engine(&self) -> &Arc<DecisionEngine> {
        &self.shared.engine
    }
}

/// Marks an actor active for the duration of its request.
struct ActiveActor<'a> {
    shared: &'a Shared,
    actor_id: ActorId,
    generation: u64,
}

impl<'a> ActiveActor<'a> {
    fn enter(shared: &'a Shared, actor_id: ActorId, generation: u64) -> Self {
        shared.inner.lock().active_actor = Some(actor_id);
        Self {
            shared,
            actor_id,
            generation,
        }
    }
}

impl Drop for ActiveActor<'_> {
    fn drop(&mut self) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.generation == self.generation {
                inner.active_actor = None;
            }
        }
        if let Some(hook) = self.shared.engine.hook() {
            hook.on_cycle_finished(self.actor_id);
        }
    }
}

impl Shared {
    /// Processor loop. A task whose `generation` is no longer current was
    /// stopped or replaced and leaves without touching shared state.
    async fn run(self: Arc<Self>, generation: u64) {
        let mut ticks = self.clock.subscribe();
        loop {
            ticks.borrow_and_update();
            if self.run_pass(generation).is_none() {
                return;
            }
            {
                let mut inner = self.inner.lock();
                if inner.generation != generation {
                    return;
                }
                inner.state = SchedulerState::Sleeping;
            }
            let tick = ticks.changed().await;
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            if tick.is_err() || inner.queue.is_empty() {
                inner.state = SchedulerState::Idle;
                inner.processor = None;
                return;
            }
            inner.state = SchedulerState::Draining;
        }
    }

    /// Processes the requests queued when the pass began, within the time
    /// slice. Returns `None` when the processor was superseded mid-pass.
    #[instrument(skip(self), fields(tick = self.clock.current()))]
    fn run_pass(&self, generation: u64) -> Option<PassReport> {
        let started = Instant::now();
        let (snapshot, pass) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return None;
            }
            inner.passes += 1;
            (inner.queue.len(), inner.passes)
        };
        self.report_depth(snapshot);

        let mut processed = 0;
        let mut budget_exhausted = false;
        while processed < snapshot {
            let elapsed = started.elapsed();
            if elapsed >= self.time_slice {
                budget_exhausted = true;
                break;
            }
            let popped = {
                let mut inner = self.inner.lock();
                (inner.generation == generation).then(|| inner.queue.pop_front())
            };
            let Some(next) = popped else {
                debug!(pass, processed, "processor superseded mid-pass");
                return None;
            };
            let Some(request) = next else {
                break;
            };
            self.process(request, self.time_slice.saturating_sub(elapsed), generation);
            processed += 1;
        }

        let remaining = self.inner.lock().queue.len();
        self.report_depth(remaining);
        let report = PassReport {
            pass,
            processed,
            remaining,
            elapsed: started.elapsed(),
            budget_exhausted,
        };
        self.engine.update_metrics(|m| {
            m.passes += 1;
            m.last_pass_ms = report.elapsed.as_secs_f64() * 1_000.0;
            if budget_exhausted {
                m.budget_exhaustions += 1;
            }
        });
        if let Some(tel) = self.engine.telemetry() {
            let _ = tel.log_at(
                self.clock.current(),
                LogLevel::Debug,
                "autonomy.scheduler.pass",
                json!({
                    "pass": pass,
                    "processed": processed,
                    "remaining": remaining,
                    "budget_exhausted": budget_exhausted,
                }),
            );
        }
        debug!(pass, processed, remaining, budget_exhausted, "autonomy pass finished");
        self.reports.send_replace(report.clone());
        Some(report)
    }

    /// Decides one request and always releases its suspension. A panicking
    /// scorer becomes an `Internal` error for that request only.
    fn process(&self, mut request: AutonomyRequest, time_slice: Duration, generation: u64) {
        let _active = ActiveActor::enter(self, request.actor_id(), generation);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.decide(&mut request, Some(time_slice))
        }))
        .unwrap_or_else(|payload| {
            request.invalidate_created_interactions(None);
            self.engine.update_metrics(|m| m.errors += 1);
            Err(AutonomyError::Internal(format!(
                "scorer panicked: {}",
                panic_message(payload.as_ref())
            )))
        });
        if let Err(err) = &result {
            error!(actor = request.actor_id(), request = %request.id(), %err, "autonomy request failed");
        }
        self.engine.finish(&mut request, result);
    }

    fn report_depth(&self, depth: usize) {
        let name = &self.engine.config().queue_depth_counter;
        self.counters
            .report(name, u64::try_from(depth).unwrap_or(u64::MAX));
        self.engine.update_metrics(|m| m.queue_depth = depth);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::{sync::Notify, time::timeout};

    use super::*;
    use crate::{
        actor::{ActorRef, AutonomousActor, AutonomyRandomization, SimActor},
        config::AutonomyConfig,
        mode::{AutonomyMode, CandidateSpec, ScoringOutput, StaticMode},
    };

    struct SlowMode {
        delay: Duration,
        calls: AtomicUsize,
        started: Notify,
    }

    impl SlowMode {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                delay: Duration::from_millis(delay_ms),
                calls: AtomicUsize::new(0),
                started: Notify::new(),
            })
        }
    }

    impl AutonomyMode for SlowMode {
        fn name(&self) -> &str {
            "slow"
        }

        fn score_all_interactions(
            &self,
            _request: &mut AutonomyRequest,
            _time_slice: Option<Duration>,
        ) -> Result<ScoringOutput, AutonomyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            std::thread::sleep(self.delay);
            Ok(ScoringOutput::Scored(Vec::new()))
        }
    }

    struct FailingMode;

    impl AutonomyMode for FailingMode {
        fn name(&self) -> &str {
            "failing"
        }

        fn score_all_interactions(
            &self,
            _request: &mut AutonomyRequest,
            _time_slice: Option<Duration>,
        ) -> Result<ScoringOutput, AutonomyError> {
            Err(AutonomyError::scoring("failing", "broken table"))
        }
    }

    struct PanickingMode;

    impl AutonomyMode for PanickingMode {
        fn name(&self) -> &str {
            "panicking"
        }

        fn score_all_interactions(
            &self,
            _request: &mut AutonomyRequest,
            _time_slice: Option<Duration>,
        ) -> Result<ScoringOutput, AutonomyError> {
            panic!("scoring table corrupted")
        }
    }

    fn scheduler(max_seconds_per_loop: f64) -> (CooperativeScheduler, SimClock, Arc<MemoryCounters>) {
        let config = AutonomyConfig {
            max_seconds_per_loop,
            rng_seed: Some(11),
            ..AutonomyConfig::default()
        };
        let clock = SimClock::new();
        let counters = Arc::new(MemoryCounters::new());
        let engine = Arc::new(DecisionEngine::new(config, None, None));
        (
            CooperativeScheduler::new(engine, clock.clone(), counters.clone()),
            clock,
            counters,
        )
    }

    fn actors(count: u64) -> Vec<Arc<SimActor>> {
        (1..=count)
            .map(|id| {
                Arc::new(
                    SimActor::new(id, format!("sim-{id}"))
                        .with_randomization(AutonomyRandomization::Disabled),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn pass_respects_time_slice() {
        let (scheduler, clock, _counters) = scheduler(0.030);
        let mode = SlowMode::new(20);
        let actors = actors(4);
        let mut reports = scheduler.subscribe_passes();
        let handles: Vec<_> = actors
            .iter()
            .map(|actor| {
                scheduler
                    .enqueue(AutonomyRequest::new(ActorRef::new(actor), mode.clone()))
                    .unwrap()
            })
            .collect();

        reports.changed().await.unwrap();
        let first = reports.borrow_and_update().clone();
        assert!((1..=2).contains(&first.processed), "processed {}", first.processed);
        assert!(first.budget_exhausted);
        assert_eq!(first.remaining, 4 - first.processed);
        assert_eq!(scheduler.queue_depth(), first.remaining);

        while scheduler.queue_depth() > 0 {
            clock.advance();
            reports.changed().await.unwrap();
        }
        for handle in handles {
            assert!(handle.outcome().await.unwrap().is_none());
        }
        assert_eq!(mode.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn drains_in_fifo_order_and_goes_idle() {
        let (scheduler, clock, counters) = scheduler(1.0);
        let actors = actors(3);
        let mut mode = StaticMode::default();
        for actor in &actors {
            mode = mode.with_candidates(
                actor.id(),
                vec![CandidateSpec::new(format!("task-{}", actor.id()), Some(1), 1.0)],
            );
        }
        let mode = Arc::new(mode);
        let mut reports = scheduler.subscribe_passes();
        let handles: Vec<_> = actors
            .iter()
            .map(|actor| {
                scheduler
                    .enqueue(AutonomyRequest::new(ActorRef::new(actor), mode.clone()))
                    .unwrap()
            })
            .collect();
        assert_eq!(scheduler.queued_actor_ids(), vec![1, 2, 3]);

        reports.changed().await.unwrap();
        assert_eq!(reports.borrow().processed, 3);
        assert_eq!(counters.get("autonomy_queue_length"), Some(0));
        for (actor, handle) in actors.iter().zip(handles) {
            let chosen = handle.outcome().await.unwrap().unwrap();
            assert_eq!(chosen.kind(), format!("task-{}", actor.id()));
        }

        assert_eq!(scheduler.state(), SchedulerState::Sleeping);
        clock.advance();
        for _ in 0..10 {
            if scheduler.state() == SchedulerState::Idle {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.engine().metrics().processed, 3);
    }

    #[tokio::test]
    async fn errors_reach_the_caller_and_the_loop_continues() {
        let (scheduler, _clock, _counters) = scheduler(1.0);
        let actors = actors(2);
        let good = Arc::new(
            StaticMode::default().with_candidates(2, vec![CandidateSpec::new("wave", Some(1), 1.0)]),
        );
        let failing = scheduler
            .enqueue(AutonomyRequest::new(ActorRef::new(&actors[0]), Arc::new(FailingMode)))
            .unwrap();
        let working = scheduler
            .enqueue(AutonomyRequest::new(ActorRef::new(&actors[1]), good))
            .unwrap();
        assert!(matches!(
            failing.outcome().await,
            Err(AutonomyError::Scoring { .. })
        ));
        assert!(working.outcome().await.unwrap().is_some());
        assert_eq!(scheduler.engine().metrics().errors, 1);
    }

    #[tokio::test]
    async fn abandoned_requests_still_release() {
        let (scheduler, _clock, _counters) = scheduler(1.0);
        let actor = Arc::new(SimActor::new(9, "Ghost"));
        let handle = scheduler
            .enqueue(AutonomyRequest::new(ActorRef::new(&actor), Arc::new(StaticMode::default())))
            .unwrap();
        drop(actor);
        assert!(handle.outcome().await.unwrap().is_none());
        assert_eq!(scheduler.engine().metrics().abandoned, 1);
    }

    #[tokio::test]
    async fn stop_keeps_queue_and_restart_drains_it() {
        let (scheduler, clock, _counters) = scheduler(0.030);
        let mode = SlowMode::new(20);
        let actors = actors(4);
        let mut reports = scheduler.subscribe_passes();
        let mut handles: Vec<_> = actors
            .iter()
            .take(3)
            .map(|actor| {
                scheduler
                    .enqueue(AutonomyRequest::new(ActorRef::new(actor), mode.clone()))
                    .unwrap()
            })
            .collect();
        reports.changed().await.unwrap();
        let left = scheduler.queue_depth();
        assert!(left > 0);

        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        clock.advance();
        tokio::task::yield_now().await;
        assert_eq!(scheduler.queue_depth(), left);

        handles.push(
            scheduler
                .enqueue(AutonomyRequest::new(ActorRef::new(&actors[3]), mode.clone()))
                .unwrap(),
        );
        while scheduler.queue_depth() > 0 {
            reports.changed().await.unwrap();
            clock.advance();
        }
        for handle in handles {
            assert!(handle.outcome().await.unwrap().is_none());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn request_queued_mid_pass_waits_for_next_tick() {
        let (scheduler, clock, _counters) = scheduler(1.0);
        let mode = SlowMode::new(100);
        let actors = actors(2);
        let mut reports = scheduler.subscribe_passes();
        let early = scheduler
            .enqueue(AutonomyRequest::new(ActorRef::new(&actors[0]), mode.clone()))
            .unwrap();
        mode.started.notified().await;
        let late = scheduler
            .enqueue(AutonomyRequest::new(ActorRef::new(&actors[1]), mode.clone()))
            .unwrap();

        reports.changed().await.unwrap();
        let first = reports.borrow_and_update().clone();
        assert_eq!(first.pass, 1);
        assert_eq!(first.processed, 1);
        assert_eq!(first.remaining, 1);
        assert!(early.outcome().await.unwrap().is_none());
        assert_eq!(scheduler.queued_actor_ids(), vec![2]);
        assert_eq!(mode.calls.load(Ordering::SeqCst), 1);

        clock.advance();
        let outcome = timeout(Duration::from_secs(2), late.outcome()).await.unwrap();
        assert!(outcome.unwrap().is_none());
        reports.changed().await.unwrap();
        let second = reports.borrow().clone();
        assert_eq!(second.pass, 2);
        assert_eq!(second.processed, 1);
        assert_eq!(second.remaining, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_mid_pass_then_enqueue_restarts_processing() {
        let (scheduler, _clock, _counters) = scheduler(1.0);
        let mode = SlowMode::new(100);
        let actors = actors(4);
        let mut handles: Vec<_> = actors
            .iter()
            .take(3)
            .map(|actor| {
                scheduler
                    .enqueue(AutonomyRequest::new(ActorRef::new(actor), mode.clone()))
                    .unwrap()
            })
            .collect();
        mode.started.notified().await;
        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        let in_flight = handles.remove(0);
        let outcome = timeout(Duration::from_secs(2), in_flight.outcome()).await.unwrap();
        assert!(outcome.unwrap().is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(scheduler.queued_actor_ids(), vec![2, 3]);
        assert_eq!(mode.calls.load(Ordering::SeqCst), 1);

        handles.push(
            scheduler
                .enqueue(AutonomyRequest::new(ActorRef::new(&actors[3]), mode.clone()))
                .unwrap(),
        );
        for handle in handles {
            let outcome = timeout(Duration::from_secs(2), handle.outcome()).await.unwrap();
            assert!(outcome.unwrap().is_none());
        }
        assert_eq!(mode.calls.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.queue_depth(), 0);
    }

    #[tokio::test]
    async fn panicking_scorer_fails_its_request_and_the_loop_survives() {
        let (scheduler, clock, _counters) = scheduler(1.0);
        let actors = actors(2);
        let broken = scheduler
            .enqueue(AutonomyRequest::new(ActorRef::new(&actors[0]), Arc::new(PanickingMode)))
            .unwrap();
        let err = broken.outcome().await.unwrap_err();
        assert!(
            matches!(&err, AutonomyError::Internal(msg) if msg.contains("scoring table corrupted")),
            "unexpected error {err:?}"
        );
        assert_eq!(scheduler.active_actor(), None);

        let good = Arc::new(
            StaticMode::default().with_candidates(2, vec![CandidateSpec::new("wave", Some(1), 1.0)]),
        );
        let after = scheduler
            .enqueue(AutonomyRequest::new(ActorRef::new(&actors[1]), good))
            .unwrap();
        clock.advance();
        let chosen = timeout(Duration::from_secs(2), after.outcome())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(chosen.kind(), "wave");
        assert_eq!(scheduler.engine().metrics().errors, 1);
    }
}
