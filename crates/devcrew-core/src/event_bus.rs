use tokio::sync::broadcast;

use devcrew_types::EngineEvent;

/// Durable-enough pub/sub fan-out for job lifecycle events. Publishing
/// never blocks on subscriber presence: a send with no receivers is
/// dropped silently, matching the at-most-once delivery the job store's
/// API contract promises (§4.5 — clients resubscribe and poll for
/// authoritative state on reconnect).
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
