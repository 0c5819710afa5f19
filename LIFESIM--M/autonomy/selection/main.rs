//! Interaction selection: ranking, route-time fallback, random policies,
//! the multitasking veto, and the sub-variant second pass.

/// Debug records of selection passes.
pub mod archive;
/// Weighted and uniform sampling.
pub mod weighted;

use rand::Rng;
use tracing::{debug, warn};

use archive::{ArchivedCandidate, SelectionPhase, SelectionPolicy, SelectionRecord};

use crate::{
    actor::AutonomousActor,
    request::{AutonomyRequest, RandomizationOverride},
    scored::{InteractionHandle, ScoredInteractionData},
};

/// Added to the longest route time so the longest route still scores
/// slightly above zero and the denominator is never zero.
pub const ROUTE_TIME_EPSILON: f64 = 0.0001;

/// Per-pass selection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionParams {
    /// Keep every candidate instead of the top `num_interactions`.
    pub consider_all_options: bool,
    /// Effective randomization override.
    pub randomization_override: RandomizationOverride,
    /// Top-K cut.
    pub num_interactions: usize,
    /// Pass being run.
    pub phase: SelectionPhase,
}

impl SelectionParams {
    /// Primary-pass parameters for `request`.
    #[must_use]
    pub fn for_request(request: &AutonomyRequest, num_interactions: usize) -> Self {
        Self {
            consider_all_options: request.options().consider_all_options,
            randomization_override: request.context().randomization_override,
            num_interactions: num_interactions.max(1),
            phase: SelectionPhase::Primary,
        }
    }

    /// Same parameters for the sub-variant pass.
    #[must_use]
    pub const fn secondary(self) -> Self {
        Self {
            phase: SelectionPhase::Secondary,
            ..self
        }
    }
}

/// Ranks `scored` and picks one interaction for the request's actor, or
/// `None` when nothing is acceptable.
pub fn choose_best_interaction<R: Rng + ?Sized>(
    scored: &[ScoredInteractionData],
    request: &mut AutonomyRequest,
    actor: &dyn AutonomousActor,
    params: SelectionParams,
    rng: &mut R,
) -> Option<InteractionHandle> {
    if scored.is_empty() {
        return None;
    }

    let mut candidates: Vec<ScoredInteractionData> = scored
        .iter()
        .filter(|entry| entry.interaction().target().is_some())
        .cloned()
        .collect();
    sort_ascending(&mut candidates);

    let consider_zero = request.consider_scores_of_zero();
    let mut routed = false;
    let best_score = candidates.last().map(ScoredInteractionData::score)?;
    if !consider_zero && request.mode().allows_routing() && best_score <= 0.0 {
        if let Some(rescored) = rescore_by_route_time(&candidates) {
            candidates = rescored;
            sort_ascending(&mut candidates);
            routed = true;
        }
    }

    if !params.consider_all_options && candidates.len() > params.num_interactions {
        candidates.drain(..candidates.len() - params.num_interactions);
    }
    if candidates.is_empty() {
        return None;
    }

    let randomize = params
        .randomization_override
        .resolve(actor.autonomy_randomization());
    let (winner, policy, probabilities) = if randomize {
        if !consider_zero {
            let first_positive = candidates
                .iter()
                .position(|entry| entry.score() > 0.0)
                .unwrap_or(candidates.len());
            candidates.drain(..first_positive);
        }
        let best = candidates.last().map(ScoredInteractionData::score)?;
        if best > 0.0 {
            let scores: Vec<f64> = candidates.iter().map(ScoredInteractionData::score).collect();
            let policy = if routed {
                SelectionPolicy::WeightedRouteDist
            } else {
                SelectionPolicy::WeightedScore
            };
            let index = weighted::weighted_index(&scores, rng);
            (index, policy, weighted::probabilities(&scores))
        } else {
            #[allow(clippy::cast_precision_loss)]
            let share = 1.0 / candidates.len() as f64;
            let index = weighted::uniform_index(candidates.len(), rng);
            (index, SelectionPolicy::Uniform, vec![share; candidates.len()])
        }
    } else {
        let last = candidates.len() - 1;
        let acceptable = consider_zero || candidates[last].score() > 0.0;
        let mut probabilities = vec![0.0; candidates.len()];
        if acceptable {
            probabilities[last] = 1.0;
        }
        (acceptable.then_some(last), SelectionPolicy::BestScore, probabilities)
    };

    let chosen = winner.map(|index| candidates[index].clone());
    let vetoed = chosen
        .as_ref()
        .is_some_and(|entry| multitasking_veto(entry, request, actor));

    if request.archive_enabled() {
        request.record_selection(SelectionRecord {
            request_id: request.id(),
            actor_id: actor.id(),
            phase: params.phase,
            policy,
            candidates: candidates
                .iter()
                .zip(&probabilities)
                .map(|(entry, probability)| ArchivedCandidate::new(entry, *probability))
                .collect(),
            chosen: chosen.as_ref().map(|entry| entry.interaction().id()),
            vetoed,
        });
    }

    let chosen = chosen?;
    if vetoed {
        debug!(
            actor = actor.id(),
            kind = chosen.interaction().kind(),
            roll = actor.multitasking_roll(),
            allowance = chosen.multitasking_percentage(),
            "multitasking roll vetoed autonomous selection"
        );
        return None;
    }
    debug!(
        actor = actor.id(),
        kind = chosen.interaction().kind(),
        score = chosen.score(),
        ?policy,
        phase = ?params.phase,
        "interaction selected"
    );
    Some(chosen.interaction().clone())
}

/// Full selection for a scored request: the primary pass over the
/// request's candidates, then a second pass over cached sub-variants of a
/// top-level winner. Every speculative candidate except the result is
/// invalidated afterwards.
pub fn select_interaction<R: Rng + ?Sized>(
    request: &mut AutonomyRequest,
    actor: &dyn AutonomousActor,
    params: SelectionParams,
    rng: &mut R,
) -> Option<InteractionHandle> {
    let scored = request.valid_interactions().to_vec();
    let mut chosen = choose_best_interaction(&scored, request, actor, params, rng);

    if let Some(winner) = chosen.clone() {
        if winner.is_super() && !winner.use_best_scoring_aop() {
            match request.similar_for(winner.kind()).map(<[_]>::to_vec) {
                Some(similar) => {
                    chosen =
                        choose_best_interaction(&similar, request, actor, params.secondary(), rng);
                }
                None => warn!(
                    actor = actor.id(),
                    kind = winner.kind(),
                    "no cached sub-variants for selected interaction; keeping top-level winner"
                ),
            }
        }
    }

    request.invalidate_created_interactions(chosen.as_ref());
    chosen
}

fn sort_ascending(candidates: &mut [ScoredInteractionData]) {
    candidates.sort_by(|a, b| a.score().total_cmp(&b.score()));
}

/// Rescores candidates so shorter routes score higher. `None` when every
/// route time is zero.
fn rescore_by_route_time(candidates: &[ScoredInteractionData]) -> Option<Vec<ScoredInteractionData>> {
    let max_route_time = candidates
        .iter()
        .map(ScoredInteractionData::route_time)
        .fold(0.0_f64, f64::max);
    if max_route_time <= 0.0 {
        return None;
    }
    let denominator = max_route_time + ROUTE_TIME_EPSILON;
    Some(
        candidates
            .iter()
            .map(|entry| entry.rescored(1.0 - entry.route_time() / denominator))
            .collect(),
    )
}

fn multitasking_veto(
    entry: &ScoredInteractionData,
    request: &AutonomyRequest,
    actor: &dyn AutonomousActor,
) -> bool {
    let context = request.context();
    entry.interaction().is_super()
        && !context.is_script_request
        && context.is_autonomous()
        && actor.multitasking_roll() > entry.multitasking_percentage()
}
