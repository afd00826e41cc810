//! Engine events for observer-style consumers.
//!
//! The polled mirror tick remains the subscriber baseline; these events
//! exist for consumers that prefer push notification of cache updates
//! (badge counters, sounds) without the tick's latency floor.

use tokio::sync::broadcast;

/// Events published after each fetch cycle.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The cache was replaced with a merged fetch result.
    Updated {
        domain: String,
        newly_arrived: Vec<i64>,
        unread: usize,
    },
    /// A fetch failed; the previous cache contents remain visible.
    FetchFailed { domain: String, message: String },
}

/// Broadcaster for sync events.
#[derive(Clone)]
pub struct SyncEventBroadcaster {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of receivers it reached; zero
    /// receivers is not an error.
    pub fn publish(&self, event: SyncEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SyncEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
