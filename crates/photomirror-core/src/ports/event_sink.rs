//! Lifecycle event bus
//!
//! Components deep in the engine report progress through a cheap-clone
//! [`EventBus`] handle instead of reaching into a global namespace.
//! Emission is fire-and-forget: a send with no subscribers is not an
//! error, and handlers run on the consumer's side of a broadcast channel
//! so emitters never block.

use tokio::sync::broadcast;
use tracing::debug;

/// Buffered events per subscriber before the oldest are dropped
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// SyncEvent
// ============================================================================

/// Lifecycle events emitted across a sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Remote listings are in hand
    Fetch,
    /// The operation plan has been computed
    Diff,
    /// The write phase has begun
    Write,
    /// Asset downloads have settled; structure operations are starting
    ApplyStructure,
    /// Terminal outcome for one asset download
    RecordCompleted { uuid: String, success: bool },
    /// The run finished
    Done,
    /// The run failed; `code` is the error kind, `cause` the chain below it
    Error {
        code: String,
        message: String,
        cause: Option<String>,
    },
}

impl SyncEvent {
    /// Stable label for external consumers (progress UI, metrics exporter)
    pub fn label(&self) -> &'static str {
        match self {
            SyncEvent::Fetch => "fetch",
            SyncEvent::Diff => "diff",
            SyncEvent::Write => "write",
            SyncEvent::ApplyStructure => "structure",
            SyncEvent::RecordCompleted { .. } => "record-completed",
            SyncEvent::Done => "done",
            SyncEvent::Error { .. } => "error",
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Multi-producer, multi-consumer event sink
///
/// Cloning is cheap; every component holds its own handle. Subscribers that
/// fall behind lose the oldest events rather than slowing emitters down.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    ///
    /// Never blocks and never fails; with no subscribers the event is
    /// simply dropped.
    pub fn emit(&self, event: SyncEvent) {
        debug!(label = event.label(), "emitting event");
        let _ = self.tx.send(event);
    }

    /// Open a new subscription for an external consumer.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(SyncEvent::Fetch);
        bus.emit(SyncEvent::Done);

        assert_eq!(rx1.recv().await.unwrap(), SyncEvent::Fetch);
        assert_eq!(rx1.recv().await.unwrap(), SyncEvent::Done);
        assert_eq!(rx2.recv().await.unwrap(), SyncEvent::Fetch);
        assert_eq!(rx2.recv().await.unwrap(), SyncEvent::Done);
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        // must not panic or block
        bus.emit(SyncEvent::RecordCompleted {
            uuid: "p1".into(),
            success: true,
        });
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let bus = EventBus::new();
        let clone = bus.clone();
        let mut rx = bus.subscribe();

        clone.emit(SyncEvent::Diff);
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::Diff);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(SyncEvent::Fetch.label(), "fetch");
        assert_eq!(SyncEvent::ApplyStructure.label(), "structure");
        assert_eq!(
            SyncEvent::RecordCompleted {
                uuid: "p".into(),
                success: false
            }
            .label(),
            "record-completed"
        );
        assert_eq!(
            SyncEvent::Error {
                code: "x".into(),
                message: "y".into(),
                cause: None
            }
            .label(),
            "error"
        );
    }
}
