//! Notifications published by the search model
//!
//! Listeners subscribe to a tokio broadcast channel. Sends never block and
//! never fail the model: with no subscribers the event is simply dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{SearchId, TaskId};

/// Default broadcast channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelEvent {
    /// Initialization finished; the overflow queue has been drained
    ModelInitialized,
    NewSearch {
        search_id: SearchId,
    },
    NewTask {
        task_id: TaskId,
    },
    UpdatedTask {
        task_id: TaskId,
    },
    /// A task was absorbed into `merged_with` and discarded
    DeletedTask {
        task_id: TaskId,
        merged_with: TaskId,
    },
    NewPage {
        search_id: SearchId,
        url: String,
    },
    UpdatedPage {
        search_id: SearchId,
        url: String,
        updated: Vec<String>,
    },
    /// A background save failed; changes stay pending for the next flush
    StorageFailed {
        error: String,
    },
}

/// Broadcast sender for [`ModelEvent`]s
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ModelEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: ModelEvent) {
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
