use tokio::sync::oneshot;
use uuid::Uuid;

use crate::{actor::ActorId, error::AutonomyError, scored::InteractionHandle};

/// Final result of one decision cycle: the chosen interaction, or `None`
/// when nothing was selected.
pub type DecisionResult = Result<Option<InteractionHandle>, AutonomyError>;

/// Scheduler-side half of a request's suspension. Consumed on release, so
/// a waiting caller is woken at most once.
#[derive(Debug)]
pub struct SuspensionToken {
    sender: oneshot::Sender<DecisionResult>,
}

impl SuspensionToken {
    /// Creates a token and the handle the caller waits on.
    #[must_use]
    pub fn pair(request_id: Uuid, actor_id: ActorId) -> (Self, DecisionHandle) {
        let (sender, rx) = oneshot::channel();
        (
            Self { sender },
            DecisionHandle {
                request_id,
                actor_id,
                rx,
            },
        )
    }

    /// Wakes the caller with `result`. A caller that already gave up is
    /// not an error.
    pub fn release(self, result: DecisionResult) {
        let _ = self.sender.send(result);
    }
}

/// Handle returned to callers awaiting a queued decision.
#[derive(Debug)]
pub struct DecisionHandle {
    request_id: Uuid,
    actor_id: ActorId,
    rx: oneshot::Receiver<DecisionResult>,
}

impl DecisionHandle {
    /// Id of the queued request.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Actor the decision is for.
    #[must_use]
    pub const fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    /// Waits for the scheduler. A token dropped without release (hard
    /// stop) resolves to [`AutonomyError::Cancelled`].
    pub async fn outcome(self) -> DecisionResult {
        self.rx.await.map_err(|_| AutonomyError::Cancelled)?
    }
}
