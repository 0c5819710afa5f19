use std::collections::VecDeque;

use crate::{actor::ActorId, error::AutonomyError, request::AutonomyRequest};

/// FIFO of pending decision requests. Requests leave in arrival order.
#[derive(Debug, Default)]
pub struct AutonomyQueue {
    pending: VecDeque<AutonomyRequest>,
}

impl AutonomyQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request. The same request id may not be queued twice.
    pub fn push_back(&mut self, request: AutonomyRequest) -> Result<(), AutonomyError> {
        if self.contains(request.id()) {
            return Err(AutonomyError::DuplicateRequest(request.id()));
        }
        self.pending.push_back(request);
        Ok(())
    }

    /// Removes the oldest request.
    pub fn pop_front(&mut self) -> Option<AutonomyRequest> {
        self.pending.pop_front()
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Actor ids in queue order.
    #[must_use]
    pub fn queued_actor_ids(&self) -> Vec<ActorId> {
        self.pending.iter().map(AutonomyRequest::actor_id).collect()
    }

    /// Whether `request_id` is pending.
    #[must_use]
    pub fn contains(&self, request_id: uuid::Uuid) -> bool {
        self.pending.iter().any(|request| request.id() == request_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        actor::{ActorRef, SimActor},
        mode::StaticMode,
    };

    #[test]
    fn requests_leave_in_arrival_order() {
        let actors: Vec<_> = (1..=4)
            .map(|id| Arc::new(SimActor::new(id, format!("sim-{id}"))))
            .collect();
        let mode = Arc::new(StaticMode::default());
        let mut queue = AutonomyQueue::new();
        for actor in &actors {
            queue
                .push_back(AutonomyRequest::new(ActorRef::new(actor), mode.clone()))
                .unwrap();
        }
        assert_eq!(queue.queued_actor_ids(), vec![1, 2, 3, 4]);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop_front())
            .map(|request| request.actor_id())
            .collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn contains_tracks_pending_ids() {
        let actor = Arc::new(SimActor::new(1, "Solo"));
        let mut queue = AutonomyQueue::new();
        let request = AutonomyRequest::new(ActorRef::new(&actor), Arc::new(StaticMode::default()));
        let id = request.id();
        queue.push_back(request).unwrap();
        assert!(queue.contains(id));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_front().map(|r| r.id()), Some(id));
        assert!(!queue.contains(id));
    }
}
