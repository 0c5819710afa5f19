use std::{fmt, time::Duration};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{
    actor::ActorId,
    error::AutonomyError,
    request::AutonomyRequest,
    scored::{CandidateInteraction, ScoredInteractionData, TargetId},
};

/// What a scoring mode handed back.
#[derive(Debug, Clone)]
pub enum ScoringOutput {
    /// Every viable candidate for the actor; may be empty.
    Scored(Vec<ScoredInteractionData>),
    /// The mode could not produce a list. Logged and treated as no action.
    Malformed(String),
}

/// Scorer boundary: enumerates and scores candidate interactions for the
/// request's actor. World queries live entirely behind this trait.
pub trait AutonomyMode: Send + Sync {
    /// Mode name for logs.
    fn name(&self) -> &str;

    /// Whether route time may stand in for score when nothing scores
    /// positively.
    fn allows_routing(&self) -> bool {
        true
    }

    /// Scores all candidates. Sub-variants of top-level candidates go into
    /// the request's similar-candidate cache. `time_slice` is the remaining
    /// pass budget, `None` when scoring inline.
    fn score_all_interactions(
        &self,
        request: &mut AutonomyRequest,
        time_slice: Option<Duration>,
    ) -> Result<ScoringOutput, AutonomyError>;
}

/// Declarative candidate row for [`StaticMode`].
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSpec {
    /// Affordance kind.
    pub kind: String,
    /// Target object.
    pub target: Option<TargetId>,
    /// Score.
    pub score: f64,
    /// Route time.
    pub route_time: f64,
    /// Multitasking allowance.
    pub multitasking_percentage: f64,
    /// Top-level action.
    pub is_super: bool,
    /// Skip sub-variant re-selection.
    pub use_best_scoring_aop: bool,
    /// Same-kind variants on other targets, cached for re-selection.
    pub variants: Vec<CandidateSpec>,
}

impl CandidateSpec {
    /// Top-level candidate with no route cost.
    #[must_use]
    pub fn new(kind: impl Into<String>, target: Option<TargetId>, score: f64) -> Self {
        Self {
            kind: kind.into(),
            target,
            score,
            route_time: 0.0,
            multitasking_percentage: 1.0,
            is_super: true,
            use_best_scoring_aop: false,
            variants: Vec::new(),
        }
    }

    /// Sets the route time.
    #[must_use]
    pub fn route_time(mut self, route_time: f64) -> Self {
        self.route_time = route_time;
        self
    }

    /// Sets the multitasking allowance.
    #[must_use]
    pub fn multitasking(mut self, percentage: f64) -> Self {
        self.multitasking_percentage = percentage;
        self
    }

    /// Marks the row as a sub-step.
    #[must_use]
    pub fn sub_step(mut self) -> Self {
        self.is_super = false;
        self
    }

    /// Adds a same-kind variant on another target.
    #[must_use]
    pub fn variant(mut self, target: Option<TargetId>, score: f64) -> Self {
        let mut variant = Self::new(self.kind.clone(), target, score);
        variant.multitasking_percentage = self.multitasking_percentage;
        self.variants.push(variant);
        self
    }

    fn materialize(&self) -> ScoredInteractionData {
        let mut candidate = CandidateInteraction::new(self.kind.clone(), self.target);
        if !self.is_super {
            candidate = candidate.sub_step();
        }
        if self.use_best_scoring_aop {
            candidate = candidate.best_scoring_aop();
        }
        ScoredInteractionData::new(candidate.into_handle(), self.score)
            .with_route_time(self.route_time)
            .with_multitasking_percentage(self.multitasking_percentage)
    }
}

/// Table-driven mode: each actor id maps to a fixed candidate list. Every
/// scoring call materializes fresh candidates.
pub struct StaticMode {
    name: String,
    allows_routing: bool,
    table: RwLock<IndexMap<ActorId, Vec<CandidateSpec>>>,
}

impl Default for StaticMode {
    fn default() -> Self {
        Self::new("static")
    }
}

impl fmt::Debug for StaticMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticMode")
            .field("name", &self.name)
            .field("actors", &self.table.read().len())
            .finish()
    }
}

impl StaticMode {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allows_routing: true,
            table: RwLock::new(IndexMap::new()),
        }
    }

    /// Disables the route-time fallback.
    #[must_use]
    pub fn without_routing(mut self) -> Self {
        self.allows_routing = false;
        self
    }

    /// Sets the rows for `actor`.
    #[must_use]
    pub fn with_candidates(self, actor: ActorId, rows: Vec<CandidateSpec>) -> Self {
        self.set_candidates(actor, rows);
        self
    }

    /// Replaces the rows for `actor`.
    pub fn set_candidates(&self, actor: ActorId, rows: Vec<CandidateSpec>) {
        self.table.write().insert(actor, rows);
    }
}

impl AutonomyMode for StaticMode {
    fn name(&self) -> &str {
        &self.name
    }

    fn allows_routing(&self) -> bool {
        self.allows_routing
    }

    fn score_all_interactions(
        &self,
        request: &mut AutonomyRequest,
        _time_slice: Option<Duration>,
    ) -> Result<ScoringOutput, AutonomyError> {
        let rows = self
            .table
            .read()
            .get(&request.actor_id())
            .cloned()
            .unwrap_or_default();
        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let entry = row.materialize();
            if row.is_super && !row.variants.is_empty() {
                let variants = row.variants.iter().map(CandidateSpec::materialize);
                request.cache_similar(row.kind.clone(), std::iter::once(entry.clone()).chain(variants));
            }
            scored.push(entry);
        }
        Ok(ScoringOutput::Scored(scored))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::actor::{ActorRef, SimActor};

    #[test]
    fn static_mode_materializes_rows_and_variants() {
        let mode = Arc::new(StaticMode::default().with_candidates(
            1,
            vec![
                CandidateSpec::new("eat", Some(10), 3.0).variant(Some(11), 2.0),
                CandidateSpec::new("wave", Some(20), 1.0).sub_step(),
            ],
        ));
        let actor = Arc::new(SimActor::new(1, "Bob"));
        let mut request = AutonomyRequest::new(ActorRef::new(&actor), mode.clone());
        let ScoringOutput::Scored(scored) = mode.score_all_interactions(&mut request, None).unwrap()
        else {
            panic!("expected scored output");
        };
        assert_eq!(scored.len(), 2);
        assert!(!scored[1].interaction().is_super());
        let cached = request.similar_for("eat").unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].interaction().id(), scored[0].interaction().id());
    }

    #[test]
    fn unknown_actor_scores_nothing() {
        let mode = Arc::new(StaticMode::default());
        let actor = Arc::new(SimActor::new(9, "Nobody"));
        let mut request = AutonomyRequest::new(ActorRef::new(&actor), mode.clone());
        match mode.score_all_interactions(&mut request, None).unwrap() {
            ScoringOutput::Scored(scored) => assert!(scored.is_empty()),
            ScoringOutput::Malformed(reason) => panic!("unexpected malformed output: {reason}"),
        }
    }
}
