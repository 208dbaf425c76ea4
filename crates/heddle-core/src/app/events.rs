//! Event bus - in-process fan-out of scheduler events.
//!
//! Publishing never blocks and never fails: with no subscribers the event is
//! dropped, and a subscriber that falls more than `capacity` events behind
//! sees `RecvError::Lagged` on its next receive.

use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::SchedulerEvent;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    /// `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: SchedulerEvent) -> usize {
        let name = event.name();
        let delivered = self.sender.send(event).unwrap_or(0);
        trace!(event = name, delivered, "event published");
        delivered
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.sender.subscribe()
    }
}
