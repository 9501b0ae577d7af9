//! The per-device operation queue.

use crate::clock::Clock;
use crate::error::SyncResult;
use crate::events::{EventFeed, SyncEvent};
use crate::store::QueueStore;
use driftq_codec::checksum;
use driftq_core::{
    DeviceKey, Operation, OperationDraft, OperationMetadata, OperationStatus,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// The durable, keyed store of queued operations.
///
/// The queue is the single source of truth for operation status. It assigns
/// ids, checksums, and sequence numbers at enqueue time; everything it
/// assigns is immutable afterwards except status, retries, and metadata.
pub struct OperationQueue {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    events: Arc<EventFeed>,
    next_sequence: AtomicU64,
    default_max_retries: u32,
}

impl OperationQueue {
    /// Creates a queue over the given store.
    pub fn new(
        store: Arc<dyn QueueStore>,
        clock: Arc<dyn Clock>,
        events: Arc<EventFeed>,
        default_max_retries: u32,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            next_sequence: AtomicU64::new(1),
            default_max_retries,
        }
    }

    /// Validates and enqueues a draft.
    ///
    /// Assigns the id, computes the payload checksum once, stamps the
    /// enqueue time, and stores the operation as pending. Emits
    /// [`SyncEvent::OperationQueued`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::InvalidOperation`] for malformed input;
    /// enqueue never fails otherwise.
    pub fn enqueue(&self, draft: OperationDraft) -> SyncResult<Operation> {
        draft.validate()?;

        let operation = Operation {
            id: Uuid::new_v4(),
            checksum: checksum(&draft.payload),
            device: draft.device,
            kind: draft.kind,
            resource: draft.resource,
            resource_id: draft.resource_id,
            payload: draft.payload,
            priority: draft.priority,
            dependencies: draft.dependencies,
            status: OperationStatus::Pending,
            retries: 0,
            max_retries: draft.max_retries.unwrap_or(self.default_max_retries),
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            metadata: OperationMetadata {
                queued_at_ms: self.clock.now_millis(),
                attempted_at_ms: None,
                last_error: None,
            },
        };

        debug!(
            id = %operation.id,
            device = %operation.device,
            kind = operation.kind.as_str(),
            resource = %operation.resource,
            "operation queued"
        );

        self.store.put(operation.clone());
        self.events.emit(SyncEvent::OperationQueued {
            id: operation.id,
            kind: operation.kind,
            resource: operation.resource.clone(),
        });

        Ok(operation)
    }

    /// Fetches an operation by id.
    pub fn get(&self, id: &Uuid) -> Option<Operation> {
        self.store.get(id)
    }

    /// Removes an operation. Returns true if it existed.
    pub fn remove(&self, id: &Uuid) -> bool {
        self.store.delete(id)
    }

    /// Writes back a mutated operation, if it is still queued.
    ///
    /// Callers mutate through [`Operation::transition_to`], so status
    /// changes arriving here have already been checked. Returns false if
    /// the operation was removed in the meantime, in which case nothing is
    /// written; a write-back must never re-create a cleared operation.
    pub fn update(&self, operation: Operation) -> bool {
        self.store.update_if_present(operation)
    }

    /// Lists the pending operations for a device pair, sequence-ordered.
    pub fn pending(&self, device: &DeviceKey) -> Vec<Operation> {
        let mut operations: Vec<Operation> = self
            .store
            .list_device(device)
            .into_iter()
            .filter(|op| op.status == OperationStatus::Pending)
            .collect();
        operations.sort_by_key(|op| op.sequence);
        operations
    }

    /// Lists every operation for a device pair, sequence-ordered.
    pub fn all(&self, device: &DeviceKey) -> Vec<Operation> {
        let mut operations = self.store.list_device(device);
        operations.sort_by_key(|op| op.sequence);
        operations
    }

    /// Removes every operation for a device pair, emitting
    /// [`SyncEvent::QueueCleared`]. Irreversible.
    pub fn clear(&self, device: &DeviceKey) -> usize {
        let count = self.store.clear_device(device);
        debug!(device = %device, count, "queue cleared");
        self.events.emit(SyncEvent::QueueCleared {
            device: device.clone(),
            count,
        });
        count
    }
}
