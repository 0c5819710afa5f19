use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    actor::ActorId,
    scored::{InteractionId, ScoredInteractionData, TargetId},
};

/// Which selection pass produced a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPhase {
    /// Top-level candidates.
    Primary,
    /// Sub-variants of the primary winner.
    Secondary,
}

/// Policy that decided a selection pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Deterministic highest score.
    BestScore,
    /// Score-weighted random choice.
    WeightedScore,
    /// Weighted random choice over route-time scores.
    WeightedRouteDist,
    /// Uniform random choice.
    Uniform,
}

/// One candidate as it stood at the final choice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchivedCandidate {
    /// Candidate id.
    pub interaction_id: InteractionId,
    /// Affordance kind.
    pub kind: String,
    /// Target.
    pub target: Option<TargetId>,
    /// Score used for the choice (after any route-time rescoring).
    pub score: f64,
    /// Chance the candidate had of being picked.
    pub probability: f64,
}

impl ArchivedCandidate {
    pub(crate) fn new(entry: &ScoredInteractionData, probability: f64) -> Self {
        let interaction = entry.interaction();
        Self {
            interaction_id: interaction.id(),
            kind: interaction.kind().to_owned(),
            target: interaction.target(),
            score: entry.score(),
            probability,
        }
    }
}

/// Debug record of one selection pass. Never feeds back into the choice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionRecord {
    /// Request the pass belonged to.
    pub request_id: Uuid,
    /// Actor the pass decided for.
    pub actor_id: ActorId,
    /// Primary or secondary pass.
    pub phase: SelectionPhase,
    /// Deciding policy.
    pub policy: SelectionPolicy,
    /// Candidates at the final choice, ascending by score.
    pub candidates: Vec<ArchivedCandidate>,
    /// Winner before the multitasking veto.
    pub chosen: Option<InteractionId>,
    /// Whether the multitasking veto discarded the winner.
    pub vetoed: bool,
}
