use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle};

/// Simulation tick source. Suspended scheduler passes resume on the next
/// advance.
#[derive(Debug, Clone)]
pub struct SimClock {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    /// Clock at tick zero.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Advances one tick and returns the new tick.
    pub fn advance(&self) -> u64 {
        let mut next = 0;
        self.tx.send_modify(|tick| {
            *tick += 1;
            next = *tick;
        });
        next
    }

    /// Current tick.
    #[must_use]
    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Receiver woken on every advance.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Advances the clock every `period` until the task is aborted.
    #[must_use]
    pub fn drive(&self, period: Duration) -> JoinHandle<()> {
        let clock = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                clock.advance();
            }
        })
    }
}
