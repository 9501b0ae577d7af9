//! Event feed for external subscribers.
//!
//! The engine notifies subscribers (UI, logging, metrics) of queue and
//! sync activity. Notifications are one-way: the engine never waits on a
//! subscriber, and a dropped receiver is pruned on the next emit.

use crate::coordinator::SyncPassResult;
use driftq_core::{DeviceKey, OperationKind, ResolutionStrategy};
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};
use uuid::Uuid;

/// A notification emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// An operation was accepted into the queue.
    OperationQueued {
        /// Operation id.
        id: Uuid,
        /// Kind of mutation.
        kind: OperationKind,
        /// Target resource.
        resource: String,
    },
    /// A sync pass finished for a device pair.
    SyncCompleted {
        /// The device pair.
        device: DeviceKey,
        /// The pass outcome.
        result: SyncPassResult,
    },
    /// A conflict was explicitly resolved.
    ConflictResolved {
        /// The resolved operation.
        operation_id: Uuid,
        /// Strategy applied.
        strategy: ResolutionStrategy,
        /// Resolution time (epoch milliseconds).
        timestamp_ms: u64,
    },
    /// A device pair's queue was cleared.
    QueueCleared {
        /// The device pair.
        device: DeviceKey,
        /// Number of operations removed.
        count: usize,
    },
}

/// Distributes engine events to subscribers.
///
/// Thread-safe; emit order matches the order events were produced.
#[derive(Debug, Default)]
pub struct EventFeed {
    subscribers: RwLock<Vec<Sender<SyncEvent>>>,
}

impl EventFeed {
    /// Creates a new feed with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the feed.
    ///
    /// Returns a receiver for all future events. The receiver should be
    /// drained regularly to avoid unbounded channel growth.
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to all live subscribers, pruning dropped ones.
    pub fn emit(&self, event: SyncEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
