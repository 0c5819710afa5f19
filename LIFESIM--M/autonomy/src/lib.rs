#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! LifeSim autonomy engine: queued decision requests, a cooperative
//! time-sliced scheduler, and scored interaction selection.

/// Actor references and randomization preferences.
#[path = "../actor.rs"]
pub mod actor;

/// Simulation tick source.
#[path = "../clock.rs"]
pub mod clock;

/// Process-wide tuning loaded from TOML.
#[path = "../config.rs"]
pub mod config;

/// Error type shared by the engine.
#[path = "../error.rs"]
pub mod error;

/// Scorer boundary and the table-driven reference scorer.
#[path = "../mode.rs"]
pub mod mode;

/// FIFO request queue.
#[path = "../queue.rs"]
pub mod queue;

/// Decision requests, contexts and suspension tokens.
#[path = "../request/main.rs"]
pub mod request;

/// Processor task, decision engine and metrics.
#[path = "../scheduler/main.rs"]
pub mod scheduler;

/// Scored candidates and interaction handles.
#[path = "../scored.rs"]
pub mod scored;

/// Ranking and selection policies.
#[path = "../selection/main.rs"]
pub mod selection;

/// Public service and debug console.
#[path = "../service/main.rs"]
pub mod service;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use actor::{ActorId, ActorRef, AutonomousActor, AutonomyRandomization, SimActor};
pub use clock::SimClock;
pub use config::AutonomyConfig;
pub use error::AutonomyError;
pub use mode::{AutonomyMode, CandidateSpec, ScoringOutput, StaticMode};
pub use queue::AutonomyQueue;
pub use request::{
    AutonomyRequest, DecisionHandle, DecisionOptions, DecisionResult, InteractionSource,
    RandomizationOverride, RequestContext,
};
pub use scheduler::{
    AutomationHook, AutonomyMetrics, CooperativeScheduler, CounterSink, DecisionEngine,
    MemoryCounters, PassReport, SchedulerState,
};
pub use scored::{
    CandidateInteraction, Interaction, InteractionHandle, InteractionId, ScoredInteractionData,
    TargetId,
};
pub use selection::{
    archive::{SelectionPhase, SelectionPolicy, SelectionRecord},
    choose_best_interaction, select_interaction, SelectionParams,
};
pub use service::{console::ConsoleCommand, maker::AutonomyServiceBuilder, AutonomyService};
pub use telemetry::{AutonomyTelemetry, AutonomyTelemetryBuilder};
