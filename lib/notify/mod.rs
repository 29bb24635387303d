use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Change notification fanned out to viewing surfaces.
///
/// Delivery is at-least-once and unordered; the carried version lets a
/// viewer re-fetch the snapshot and recompute its display bands, so a
/// dropped or reordered event only delays convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    EntriesChanged { version: u64 },
    ConfigChanged { version: u64 },
}

/// Fire-and-forget broadcast hub over a tokio broadcast channel.
///
/// Slow subscribers lag and drop old events rather than backpressure the
/// command path; that is acceptable because events are re-fetch triggers,
/// not state. Cloning shares the same channel.
#[derive(Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Broadcasts one event. A send error only means nobody is subscribed.
    pub fn broadcast(&self, event: ChangeEvent) {
        if self.sender.send(event).is_err() {
            debug!(event = "change_broadcast_no_subscribers", change = ?event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}
