use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier of a simulated actor.
pub type ActorId = u64;

/// Per-actor randomization preference for autonomous selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AutonomyRandomization {
    /// No preference; resolves to deterministic selection.
    #[default]
    Default,
    /// Weighted or uniform random selection.
    Enabled,
    /// Always take the best candidate.
    Disabled,
}

impl AutonomyRandomization {
    /// Whether random selection applies.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// The part of a simulated actor the decision engine reads.
pub trait AutonomousActor: Send + Sync + fmt::Debug {
    /// Stable identifier.
    fn id(&self) -> ActorId;

    /// Randomization preference.
    fn autonomy_randomization(&self) -> AutonomyRandomization;

    /// Current multitasking roll in `[0, 1]`.
    fn multitasking_roll(&self) -> f64;
}

/// Nullable reference to an actor. Requests hold these so that an actor
/// removed from the world while its request waits is observed as gone.
#[derive(Clone)]
pub struct ActorRef {
    id: ActorId,
    inner: Weak<dyn AutonomousActor>,
}

impl ActorRef {
    /// Creates a weak reference to `actor`.
    #[must_use]
    pub fn new<A: AutonomousActor + 'static>(actor: &Arc<A>) -> Self {
        let strong: Arc<dyn AutonomousActor> = actor.clone();
        Self {
            id: actor.id(),
            inner: Arc::downgrade(&strong),
        }
    }

    /// Identifier captured at creation; valid even after the actor is gone.
    #[must_use]
    pub const fn id(&self) -> ActorId {
        self.id
    }

    /// Resolves the actor, `None` once it was dropped.
    #[must_use]
    pub fn upgrade(&self) -> Option<Arc<dyn AutonomousActor>> {
        self.inner.upgrade()
    }

    /// Whether the actor still exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// In-memory actor used by the demo world and tests.
#[derive(Debug)]
pub struct SimActor {
    id: ActorId,
    name: String,
    randomization: AutonomyRandomization,
    multitasking_roll: RwLock<f64>,
}

impl SimActor {
    /// Creates an actor with default randomization and a roll of zero.
    #[must_use]
    pub fn new(id: ActorId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            randomization: AutonomyRandomization::Default,
            multitasking_roll: RwLock::new(0.0),
        }
    }

    /// Sets the randomization preference.
    #[must_use]
    pub const fn with_randomization(mut self, randomization: AutonomyRandomization) -> Self {
        self.randomization = randomization;
        self
    }

    /// Sets the multitasking roll.
    #[must_use]
    pub fn with_multitasking_roll(self, roll: f64) -> Self {
        self.set_multitasking_roll(roll);
        self
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overrides the multitasking roll, clamped to `[0, 1]`.
    pub fn set_multitasking_roll(&self, roll: f64) {
        *self.multitasking_roll.write() = roll.clamp(0.0, 1.0);
    }

    /// Draws a fresh multitasking roll.
    pub fn reroll_multitasking<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let roll = rng.gen_range(0.0..=1.0);
        *self.multitasking_roll.write() = roll;
        roll
    }
}

impl AutonomousActor for SimActor {
    fn id(&self) -> ActorId {
        self.id
    }

    fn autonomy_randomization(&self) -> AutonomyRandomization {
        self.randomization
    }

    fn multitasking_roll(&self) -> f64 {
        *self.multitasking_roll.read()
    }
}
