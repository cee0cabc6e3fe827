/// Notifications for the presentation layer.
///
/// The engine pushes these onto an unbounded channel. Sending never blocks
/// and a dropped receiver is ignored, so a UI that stops listening cannot
/// stall ranking.
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::PersistenceError;
use crate::types::{ItemId, Pair};

/// Which durable write an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Score,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The pair on screen changed (`None` once fewer than two items remain).
    PairChanged(Option<Pair>),
    /// An item was taken out and can be restored until `undo_window` elapses.
    Removed { id: ItemId, undo_window: Duration },
    /// A removal was undone; the item is back at `index`.
    Restored { id: ItemId, index: usize },
    /// The grace period ended and the durable delete succeeded.
    RemovalCommitted { id: ItemId },
    /// A background write failed. Local state was kept as is.
    WriteFailed { id: ItemId, kind: WriteKind, error: PersistenceError },
}

/// Cloneable sending half handed to background tasks.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<EngineEvent>>,
}

impl EventSink {
    /// A sink plus the receiver the UI should drain.
    pub fn channel() -> (EventSink, UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = unbounded_channel();
        (EventSink { tx: Some(tx) }, rx)
    }

    /// A sink that drops everything.
    pub fn disabled() -> Self {
        EventSink { tx: None }
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
