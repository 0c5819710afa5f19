//! Per-cycle decision requests.

/// Source and randomization hints.
pub mod context;
/// Suspension token and caller-side handle.
pub mod suspension;

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use indexmap::IndexMap;
use uuid::Uuid;

pub use context::{InteractionSource, RandomizationOverride, RequestContext};
pub use suspension::{DecisionHandle, DecisionResult, SuspensionToken};

use crate::{
    actor::{ActorId, ActorRef},
    mode::AutonomyMode,
    scored::{same_interaction, InteractionHandle, ScoredInteractionData},
    selection::archive::SelectionRecord,
};

/// Caller-facing knobs for a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionOptions {
    /// Accept candidates scoring zero or below.
    pub consider_scores_of_zero: bool,
    /// Skip the top-K truncation.
    pub consider_all_options: bool,
    /// Request origin and randomization override.
    pub context: RequestContext,
    /// Force probability archiving on or off for this request.
    pub archive: Option<bool>,
}

impl DecisionOptions {
    /// Options of a user-directed request.
    #[must_use]
    pub fn user_directed() -> Self {
        Self {
            context: RequestContext::user_directed(),
            ..Self::default()
        }
    }
}

/// State of one decision cycle for one actor.
pub struct AutonomyRequest {
    id: Uuid,
    actor: ActorRef,
    mode: Arc<dyn AutonomyMode>,
    options: DecisionOptions,
    archive_enabled: bool,
    similar_aop_cache: IndexMap<String, Vec<ScoredInteractionData>>,
    valid_interactions: Vec<ScoredInteractionData>,
    selection_archive: Vec<SelectionRecord>,
    chosen: Option<InteractionHandle>,
    enqueued_at: Option<Instant>,
    sleep_element: Option<SuspensionToken>,
}

impl AutonomyRequest {
    /// Creates a request with default options.
    #[must_use]
    pub fn new(actor: ActorRef, mode: Arc<dyn AutonomyMode>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            mode,
            options: DecisionOptions::default(),
            archive_enabled: false,
            similar_aop_cache: IndexMap::new(),
            valid_interactions: Vec::new(),
            selection_archive: Vec::new(),
            chosen: None,
            enqueued_at: None,
            sleep_element: None,
        }
    }

    /// Applies caller options.
    #[must_use]
    pub fn with_options(mut self, options: DecisionOptions) -> Self {
        self.options = options;
        if let Some(archive) = options.archive {
            self.archive_enabled = archive;
        }
        self
    }

    /// Request id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Nullable actor reference.
    #[must_use]
    pub const fn actor(&self) -> &ActorRef {
        &self.actor
    }

    /// Actor id, available even after the actor is gone.
    #[must_use]
    pub const fn actor_id(&self) -> ActorId {
        self.actor.id()
    }

    /// Scoring mode to invoke.
    #[must_use]
    pub fn mode(&self) -> Arc<dyn AutonomyMode> {
        Arc::clone(&self.mode)
    }

    /// Caller options.
    #[must_use]
    pub const fn options(&self) -> &DecisionOptions {
        &self.options
    }

    /// Request context.
    #[must_use]
    pub const fn context(&self) -> &RequestContext {
        &self.options.context
    }

    /// Accept non-positive scores.
    #[must_use]
    pub const fn consider_scores_of_zero(&self) -> bool {
        self.options.consider_scores_of_zero
    }

    /// Replaces the randomization override unless the caller set one.
    pub fn inherit_randomization(&mut self, randomization: RandomizationOverride) {
        if self.options.context.randomization_override == RandomizationOverride::Inherit {
            self.options.context.randomization_override = randomization;
        }
    }

    /// Whether probabilities are archived for this request.
    #[must_use]
    pub const fn archive_enabled(&self) -> bool {
        self.archive_enabled
    }

    /// Enables archiving unless the caller decided explicitly.
    pub fn default_archive(&mut self, enabled: bool) {
        if self.options.archive.is_none() {
            self.archive_enabled = enabled;
        }
    }

    /// Adds scored sub-variants of `kind` to the similar-candidate cache.
    pub fn cache_similar(
        &mut self,
        kind: impl Into<String>,
        entries: impl IntoIterator<Item = ScoredInteractionData>,
    ) {
        self.similar_aop_cache
            .entry(kind.into())
            .or_default()
            .extend(entries);
    }

    /// Cached sub-variants for `kind`.
    #[must_use]
    pub fn similar_for(&self, kind: &str) -> Option<&[ScoredInteractionData]> {
        self.similar_aop_cache
            .get(kind)
            .map(Vec::as_slice)
            .filter(|entries| !entries.is_empty())
    }

    /// Stores the scored list of this cycle.
    pub fn set_valid_interactions(&mut self, scored: Vec<ScoredInteractionData>) {
        self.valid_interactions = scored;
    }

    /// Scored list of this cycle.
    #[must_use]
    pub fn valid_interactions(&self) -> &[ScoredInteractionData] {
        &self.valid_interactions
    }

    /// Appends a selection archive record.
    pub fn record_selection(&mut self, record: SelectionRecord) {
        self.selection_archive.push(record);
    }

    /// Archived selection records.
    #[must_use]
    pub fn selection_archive(&self) -> &[SelectionRecord] {
        &self.selection_archive
    }

    /// Stores the result of the cycle.
    pub fn set_chosen(&mut self, chosen: Option<InteractionHandle>) {
        self.chosen = chosen;
    }

    /// Result of the cycle, once processed.
    #[must_use]
    pub const fn chosen(&self) -> Option<&InteractionHandle> {
        self.chosen.as_ref()
    }

    /// Invalidates every candidate materialized during this cycle except
    /// `keep`. Returns how many candidates were invalidated.
    pub fn invalidate_created_interactions(&self, keep: Option<&InteractionHandle>) -> usize {
        let mut invalidated = 0;
        let all = self
            .valid_interactions
            .iter()
            .chain(self.similar_aop_cache.values().flatten());
        for entry in all {
            let handle = entry.interaction();
            if keep.is_some_and(|kept| same_interaction(kept, handle)) || handle.is_invalidated() {
                continue;
            }
            handle.invalidate();
            invalidated += 1;
        }
        invalidated
    }

    /// Allocates the suspension token and returns the caller's handle. A
    /// previously attached token is replaced and its caller cancelled.
    pub fn attach_suspension(&mut self) -> DecisionHandle {
        let (token, handle) = SuspensionToken::pair(self.id, self.actor_id());
        self.sleep_element = Some(token);
        handle
    }

    /// Whether a caller is still waiting.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.sleep_element.is_some()
    }

    /// Wakes the waiting caller. Returns `false` when there was nothing to
    /// release, so a second release is a no-op.
    pub fn release(&mut self, result: DecisionResult) -> bool {
        match self.sleep_element.take() {
            Some(token) => {
                token.release(result);
                true
            }
            None => false,
        }
    }

    /// Marks the moment the request entered the queue.
    pub fn mark_enqueued(&mut self) {
        self.enqueued_at = Some(Instant::now());
    }

    /// Time spent since enqueue.
    #[must_use]
    pub fn waited(&self) -> Duration {
        self.enqueued_at
            .map_or(Duration::ZERO, |enqueued| enqueued.elapsed())
    }
}

impl fmt::Debug for AutonomyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutonomyRequest")
            .field("id", &self.id)
            .field("actor", &self.actor)
            .field("mode", &self.mode.name())
            .field("options", &self.options)
            .field("cached_kinds", &self.similar_aop_cache.len())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actor::SimActor,
        mode::StaticMode,
        scored::CandidateInteraction,
    };

    fn request() -> (Arc<SimActor>, AutonomyRequest) {
        let actor = Arc::new(SimActor::new(4, "Mortimer"));
        let request = AutonomyRequest::new(ActorRef::new(&actor), Arc::new(StaticMode::default()));
        (actor, request)
    }

    #[tokio::test]
    async fn release_happens_once() {
        let (_actor, mut request) = request();
        let handle = request.attach_suspension();
        assert!(request.is_suspended());
        assert!(request.release(Ok(None)));
        assert!(!request.release(Ok(None)));
        assert!(handle.outcome().await.unwrap().is_none());
    }

    #[test]
    fn invalidates_everything_but_the_winner() {
        let (_actor, mut request) = request();
        let winner = CandidateInteraction::new("cook", Some(1)).into_handle();
        let loser = CandidateInteraction::new("read", Some(2)).into_handle();
        let variant = CandidateInteraction::new("cook", Some(3)).into_handle();
        request.set_valid_interactions(vec![
            ScoredInteractionData::new(winner.clone(), 4.0),
            ScoredInteractionData::new(loser.clone(), 1.0),
        ]);
        request.cache_similar(
            "cook",
            [
                ScoredInteractionData::new(winner.clone(), 4.0),
                ScoredInteractionData::new(variant.clone(), 2.0),
            ],
        );

        assert_eq!(request.invalidate_created_interactions(Some(&winner)), 2);
        assert!(!winner.is_invalidated());
        assert!(loser.is_invalidated());
        assert!(variant.is_invalidated());
    }

    #[test]
    fn options_control_archiving() {
        let (_actor, request) = request();
        let mut request = request.with_options(DecisionOptions {
            archive: Some(false),
            ..DecisionOptions::default()
        });
        request.default_archive(true);
        assert!(!request.archive_enabled());
        assert!(request.similar_for("cook").is_none());
    }

    #[test]
    fn caller_override_survives_service_override() {
        let (_actor, request) = request();
        let mut request = request.with_options(DecisionOptions {
            context: RequestContext::autonomous().with_randomization(RandomizationOverride::Disabled),
            ..DecisionOptions::default()
        });
        request.inherit_randomization(RandomizationOverride::Enabled);
        assert_eq!(
            request.context().randomization_override,
            RandomizationOverride::Disabled
        );
    }
}
