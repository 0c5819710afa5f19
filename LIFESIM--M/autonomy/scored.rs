use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use uuid::Uuid;

/// Identifier of a materialized candidate interaction.
pub type InteractionId = Uuid;

/// Identifier of the object or actor an interaction targets.
pub type TargetId = u64;

/// Opaque candidate action (an actor-affordance-target pairing).
pub trait Interaction: Send + Sync + fmt::Debug {
    /// Unique id of this materialized candidate.
    fn id(&self) -> InteractionId;

    /// Affordance kind; keys the similar-candidate cache.
    fn kind(&self) -> &str;

    /// Target of the interaction. Candidates without one are never chosen.
    fn target(&self) -> Option<TargetId>;

    /// Top-level action rather than a sub-step.
    fn is_super(&self) -> bool;

    /// Skip the sub-variant re-selection for this kind.
    fn use_best_scoring_aop(&self) -> bool {
        false
    }

    /// Releases resources held by a speculative candidate.
    fn invalidate(&self);

    /// Whether [`Interaction::invalidate`] was called.
    fn is_invalidated(&self) -> bool;
}

/// Shared handle to a candidate.
pub type InteractionHandle = Arc<dyn Interaction>;

/// Identity comparison for handles.
#[must_use]
pub fn same_interaction(a: &InteractionHandle, b: &InteractionHandle) -> bool {
    a.id() == b.id()
}

/// Plain candidate used by table-driven scorers and tests.
#[derive(Debug)]
pub struct CandidateInteraction {
    id: InteractionId,
    kind: String,
    target: Option<TargetId>,
    is_super: bool,
    use_best_scoring_aop: bool,
    invalidated: AtomicBool,
}

impl CandidateInteraction {
    /// Creates a top-level candidate.
    #[must_use]
    pub fn new(kind: impl Into<String>, target: Option<TargetId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            target,
            is_super: true,
            use_best_scoring_aop: false,
            invalidated: AtomicBool::new(false),
        }
    }

    /// Marks the candidate as a sub-step.
    #[must_use]
    pub fn sub_step(mut self) -> Self {
        self.is_super = false;
        self
    }

    /// Opts the candidate out of sub-variant re-selection.
    #[must_use]
    pub fn best_scoring_aop(mut self) -> Self {
        self.use_best_scoring_aop = true;
        self
    }

    /// Wraps the candidate in a shared handle.
    #[must_use]
    pub fn into_handle(self) -> InteractionHandle {
        Arc::new(self)
    }
}

impl Interaction for CandidateInteraction {
    fn id(&self) -> InteractionId {
        self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn target(&self) -> Option<TargetId> {
        self.target
    }

    fn is_super(&self) -> bool {
        self.is_super
    }

    fn use_best_scoring_aop(&self) -> bool {
        self.use_best_scoring_aop
    }

    fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }
}

/// A candidate paired with its score, route time and multitasking allowance.
#[derive(Clone)]
pub struct ScoredInteractionData {
    score: f64,
    route_time: f64,
    multitasking_percentage: f64,
    interaction: InteractionHandle,
}

impl ScoredInteractionData {
    /// Scores `interaction` with no route cost and full multitasking allowance.
    #[must_use]
    pub fn new(interaction: InteractionHandle, score: f64) -> Self {
        Self {
            score,
            route_time: 0.0,
            multitasking_percentage: 1.0,
            interaction,
        }
    }

    /// Sets the estimated route time; negative values clamp to zero.
    #[must_use]
    pub fn with_route_time(mut self, route_time: f64) -> Self {
        self.route_time = route_time.max(0.0);
        self
    }

    /// Sets the multitasking allowance, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_multitasking_percentage(mut self, percentage: f64) -> Self {
        self.multitasking_percentage = percentage.clamp(0.0, 1.0);
        self
    }

    /// Copy of this entry with a different score.
    #[must_use]
    pub fn rescored(&self, score: f64) -> Self {
        Self {
            score,
            ..self.clone()
        }
    }

    /// Higher is better.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }

    /// Estimated travel or setup cost, never negative.
    #[must_use]
    pub const fn route_time(&self) -> f64 {
        self.route_time
    }

    /// Threshold the actor's multitasking roll must not exceed.
    #[must_use]
    pub const fn multitasking_percentage(&self) -> f64 {
        self.multitasking_percentage
    }

    /// The candidate.
    #[must_use]
    pub const fn interaction(&self) -> &InteractionHandle {
        &self.interaction
    }
}

impl fmt::Debug for ScoredInteractionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoredInteractionData")
            .field("kind", &self.interaction.kind())
            .field("score", &self.score)
            .field("route_time", &self.route_time)
            .field("multitasking_percentage", &self.multitasking_percentage)
            .finish()
    }
}
