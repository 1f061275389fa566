//! In-process broadcast of outward plugin events.

use tokio::sync::broadcast;
use tracing::trace;

use billhub_core::events::{EventEmitter, PluginEvent};

/// Broadcasts plugin events to every current subscriber.
///
/// Slow subscribers that fall more than `buffer_size` events behind see
/// `RecvError::Lagged` and skip ahead.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    tx: broadcast::Sender<PluginEvent>,
}

impl BroadcastEmitter {
    /// Create an emitter with the given channel capacity.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Subscribe to all events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit(&self, event: PluginEvent) {
        let name = event.name.clone();
        let source = event.source.clone();
        if self.tx.send(event).is_err() {
            trace!(event = %name, source = %source, "No subscribers for plugin event");
        }
    }
}
