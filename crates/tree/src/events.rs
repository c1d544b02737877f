//! Change notifications for tree consumers
//!
//! Every structural change is broadcast as a [`TreeEvent`]. Consumers map
//! events to redraws: a whole-tree redraw for [`TreeEvent::Refreshed`] and
//! [`TreeEvent::Invalidated`], a node redraw for the others.

use crate::builder::BuildKind;
use serde::Serialize;
use tokio::sync::broadcast;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 256;

/// A change in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum TreeEvent {
    /// A rebuild finished
    #[serde(rename_all = "camelCase")]
    Refreshed {
        /// `full` or the rebuilt source type
        kind: String,
        /// Number of tasks in the tree afterwards
        task_count: usize,
    },
    /// The children of one root folder changed
    #[serde(rename_all = "camelCase")]
    FolderChanged {
        /// Id of the folder
        folder_id: String,
    },
    /// The state of one task changed
    #[serde(rename_all = "camelCase")]
    TaskChanged {
        /// Id of the task
        task_id: String,
    },
    /// All state was dropped
    Invalidated,
}

impl TreeEvent {
    pub(crate) fn refreshed(kind: &BuildKind, task_count: usize) -> Self {
        Self::Refreshed {
            kind: kind.to_string(),
            task_count,
        }
    }

    /// Whether consumers should redraw everything
    #[must_use]
    pub const fn is_whole_tree(&self) -> bool {
        matches!(self, Self::Refreshed { .. } | Self::Invalidated)
    }
}

/// Broadcast sender for tree events
#[derive(Debug, Clone)]
pub struct TreeEvents {
    tx: broadcast::Sender<TreeEvent>,
}

impl Default for TreeEvents {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl TreeEvents {
    /// Create a channel with a specific capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send an event to every subscriber
    pub fn emit(&self, event: TreeEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Subscribe to events sent after this call
    #[must_use]
    pub fn subscribe(&self) -> TreeEventReceiver {
        TreeEventReceiver {
            inner: self.tx.subscribe(),
        }
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving end of [`TreeEvents`]
#[derive(Debug)]
pub struct TreeEventReceiver {
    inner: broadcast::Receiver<TreeEvent>,
}

impl TreeEventReceiver {
    /// Receive the next event, `None` once the sender is gone.
    ///
    /// Events missed by a lagging receiver are skipped.
    pub async fn recv(&mut self) -> Option<TreeEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Tree event receiver lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive an event if one is ready
    pub fn try_recv(&mut self) -> Option<TreeEvent> {
        loop {
            match self.inner.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Tree event receiver lagged, skipped events");
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }

    /// Drain every ready event
    pub fn drain(&mut self) -> Vec<TreeEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
