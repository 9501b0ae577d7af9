//! Pluggable queue storage.

use driftq_core::{DeviceKey, Operation, OperationStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// A key-value store for queued operations.
///
/// The store is the engine's only shared mutable resource. Implementations
/// must serialize per-key writes: a `put` racing a `list_device` must never
/// expose a torn operation.
///
/// # Invariants
///
/// - Exactly one live operation per id
/// - `put` replaces any existing operation with the same id
/// - `list_device` returns only operations owned by the given pair
///
/// # Implementors
///
/// - [`MemoryStore`] - the in-process reference store
/// - Production deployments supply a disk-backed implementation so queued
///   operations survive restarts
pub trait QueueStore: Send + Sync {
    /// Fetches an operation by id.
    fn get(&self, id: &Uuid) -> Option<Operation>;

    /// Inserts or replaces an operation.
    fn put(&self, operation: Operation);

    /// Replaces an operation only if one with the same id still exists.
    ///
    /// Returns true if the write happened. The existence check and the
    /// write must be atomic, so a write-back racing a delete can never
    /// resurrect a removed operation.
    fn update_if_present(&self, operation: Operation) -> bool;

    /// Deletes an operation. Returns true if it existed.
    fn delete(&self, id: &Uuid) -> bool;

    /// Lists all operations for a device pair, in unspecified order.
    fn list_device(&self, device: &DeviceKey) -> Vec<Operation>;

    /// Removes every operation for a device pair. Returns the count removed.
    fn clear_device(&self, device: &DeviceKey) -> usize;
}

/// An in-memory queue store.
///
/// Suitable for unit tests, integration tests, and callers that accept
/// losing the queue on process exit. A single lock covers the map, which
/// satisfies the per-key atomicity requirement.
#[derive(Debug, Default)]
pub struct MemoryStore {
    operations: RwLock<HashMap<Uuid, Operation>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored operations, across all devices.
    pub fn len(&self) -> usize {
        self.operations.read().len()
    }

    /// Returns true if the store holds no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.read().is_empty()
    }

    /// Counts operations for a device pair with the given status.
    pub fn count_status(&self, device: &DeviceKey, status: OperationStatus) -> usize {
        self.operations
            .read()
            .values()
            .filter(|op| &op.device == device && op.status == status)
            .count()
    }
}

impl QueueStore for MemoryStore {
    fn get(&self, id: &Uuid) -> Option<Operation> {
        self.operations.read().get(id).cloned()
    }

    fn put(&self, operation: Operation) {
        self.operations.write().insert(operation.id, operation);
    }

    fn update_if_present(&self, operation: Operation) -> bool {
        let mut operations = self.operations.write();
        if operations.contains_key(&operation.id) {
            operations.insert(operation.id, operation);
            true
        } else {
            false
        }
    }

    fn delete(&self, id: &Uuid) -> bool {
        self.operations.write().remove(id).is_some()
    }

    fn list_device(&self, device: &DeviceKey) -> Vec<Operation> {
        self.operations
            .read()
            .values()
            .filter(|op| &op.device == device)
            .cloned()
            .collect()
    }

    fn clear_device(&self, device: &DeviceKey) -> usize {
        let mut operations = self.operations.write();
        let before = operations.len();
        operations.retain(|_, op| &op.device != device);
        before - operations.len()
    }
}
