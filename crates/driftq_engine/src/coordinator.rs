//! The sync coordinator: one serialized pass per device pair.

use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventFeed, SyncEvent};
use crate::queue::OperationQueue;
use crate::tracker::{HistoryEntry, StatsTracker};
use crate::transport::{DispatchOutcome, SyncTransport};
use driftq_core::{
    resolve_payloads, ConflictRecord, DeviceKey, Operation, OperationStatus, ResolutionStrategy,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An operation that exhausted its retry budget during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedOperation {
    /// The failed operation.
    pub id: Uuid,
    /// The transport error that exhausted it.
    pub error: String,
}

/// The outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPassResult {
    /// Operations applied by the server and removed from the queue.
    pub successful: Vec<Uuid>,
    /// Operations that exhausted their retry budget this pass.
    pub failed: Vec<FailedOperation>,
    /// Operations that entered conflict this pass.
    pub conflicts: Vec<Uuid>,
    /// Operations selected at the start of the pass.
    pub total: usize,
}

/// Orchestrates sync passes and conflict resolution.
///
/// The coordinator enforces single-flight per device pair: while a pass for
/// a pair is in flight, a second call for the same pair fails fast with
/// [`SyncError::PassInFlight`]. Within a pass, operations dispatch serially
/// in priority-then-enqueue order, so the transport never observes
/// out-of-order writes for a device.
pub struct SyncCoordinator {
    queue: Arc<OperationQueue>,
    transport: Arc<dyn SyncTransport>,
    tracker: Arc<StatsTracker>,
    events: Arc<EventFeed>,
    clock: Arc<dyn Clock>,
    conflicts: RwLock<HashMap<Uuid, ConflictRecord>>,
    in_flight: Mutex<HashSet<DeviceKey>>,
}

/// Releases the single-flight slot when the pass ends, on every exit path.
struct PassGuard<'a> {
    coordinator: &'a SyncCoordinator,
    device: DeviceKey,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.in_flight.lock().remove(&self.device);
    }
}

impl SyncCoordinator {
    /// Creates a coordinator over the given collaborators.
    pub fn new(
        queue: Arc<OperationQueue>,
        transport: Arc<dyn SyncTransport>,
        tracker: Arc<StatsTracker>,
        events: Arc<EventFeed>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            transport,
            tracker,
            events,
            clock,
            conflicts: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Runs one sync pass for a device pair.
    ///
    /// Selects the pair's pending operations, orders them by priority rank
    /// then enqueue time, and dispatches each serially. A single
    /// operation's transient failure never aborts the pass; the result
    /// always covers every attempted operation.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PassInFlight`] if a pass for this pair has not
    /// yet returned. No operations are attempted in that case.
    pub fn sync_device(&self, device: &DeviceKey) -> SyncResult<SyncPassResult> {
        let _guard = self.begin_pass(device)?;

        let mut operations = self.queue.pending(device);
        operations.sort_by_key(|op| {
            (op.priority.rank(), op.metadata.queued_at_ms, op.sequence)
        });

        debug!(device = %device, pending = operations.len(), "sync pass started");

        let mut result = SyncPassResult {
            total: operations.len(),
            ..SyncPassResult::default()
        };

        for operation in operations {
            self.dispatch(operation, &mut result);
        }

        self.tracker.record(
            device,
            HistoryEntry {
                timestamp_ms: self.clock.now_millis(),
                total: result.total,
                successful: result.successful.len(),
                failed: result.failed.len(),
                conflicts: result.conflicts.len(),
            },
        );

        info!(
            device = %device,
            total = result.total,
            successful = result.successful.len(),
            failed = result.failed.len(),
            conflicts = result.conflicts.len(),
            "sync pass completed"
        );

        self.events.emit(SyncEvent::SyncCompleted {
            device: device.clone(),
            result: result.clone(),
        });

        Ok(result)
    }

    /// Resolves a conflicted operation.
    ///
    /// Applies the strategy to the payload pair, marks the operation
    /// resolved, records the resolution on the conflict log, and emits
    /// [`SyncEvent::ConflictResolved`]. Returns the resolved payload.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownOperation`] for an unknown id and
    /// [`SyncError::InvalidState`] when the operation is not in conflict.
    pub fn resolve_conflict(
        &self,
        operation_id: Uuid,
        local: &Value,
        remote: &Value,
        strategy: ResolutionStrategy,
    ) -> SyncResult<Value> {
        let mut operation = self
            .queue
            .get(&operation_id)
            .ok_or(SyncError::UnknownOperation(operation_id))?;

        if operation.status != OperationStatus::Conflict {
            return Err(SyncError::InvalidState {
                id: operation_id,
                status: operation.status,
                expected: OperationStatus::Conflict,
            });
        }

        let resolved = resolve_payloads(strategy, local, remote);
        let now = self.clock.now_millis();

        operation.transition_to(OperationStatus::Resolved)?;
        self.queue.update(operation);

        if let Some(record) = self.conflicts.write().get_mut(&operation_id) {
            record.mark_resolved(strategy, now);
        }

        info!(
            operation = %operation_id,
            strategy = strategy.as_str(),
            "conflict resolved"
        );

        self.events.emit(SyncEvent::ConflictResolved {
            operation_id,
            strategy,
            timestamp_ms: now,
        });

        Ok(resolved)
    }

    /// Fetches the conflict record for an operation, if one exists.
    pub fn conflict_record(&self, operation_id: &Uuid) -> Option<ConflictRecord> {
        self.conflicts.read().get(operation_id).cloned()
    }

    /// Removes every queued operation and conflict record for a pair.
    ///
    /// Conflict records hold user payloads, so clearing a pair drops its
    /// records as well, resolved or not. Returns the number of queued
    /// operations removed. History is retained.
    pub fn clear_device(&self, device: &DeviceKey) -> usize {
        let count = self.tracker.clear(device);
        self.conflicts
            .write()
            .retain(|_, record| &record.device != device);
        count
    }

    /// Claims the single-flight slot for a pair.
    fn begin_pass(&self, device: &DeviceKey) -> SyncResult<PassGuard<'_>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(device.clone()) {
            return Err(SyncError::PassInFlight {
                device: device.clone(),
            });
        }
        Ok(PassGuard {
            coordinator: self,
            device: device.clone(),
        })
    }

    /// Dispatches one operation, routing every outcome into the result.
    ///
    /// A transition refused by the state machine is the engine's own bug,
    /// not the caller's; it is reported as a failed operation so the rest
    /// of the pass still dispatches.
    fn dispatch(&self, operation: Operation, result: &mut SyncPassResult) {
        let id = operation.id;
        if let Err(error) = self.try_dispatch(operation, result) {
            warn!(operation = %id, error = %error, "dispatch aborted");
            result.failed.push(FailedOperation {
                id,
                error: error.to_string(),
            });
        }
    }

    /// Attempts one dispatch.
    ///
    /// Every write-back is conditional on the operation still being
    /// queued. A concurrent clear removes operations mid-pass; once that
    /// happens the outcome is dropped so the operation is neither
    /// re-created nor reported.
    fn try_dispatch(
        &self,
        mut operation: Operation,
        result: &mut SyncPassResult,
    ) -> SyncResult<()> {
        operation.transition_to(OperationStatus::Syncing)?;
        operation.metadata.attempted_at_ms = Some(self.clock.now_millis());
        if !self.queue.update(operation.clone()) {
            debug!(operation = %operation.id, "cleared before dispatch, skipped");
            return Ok(());
        }

        match self.transport.execute(&operation) {
            Ok(DispatchOutcome::Applied) => {
                operation.transition_to(OperationStatus::Synced)?;
                if self.queue.remove(&operation.id) {
                    result.successful.push(operation.id);
                }
            }
            Ok(DispatchOutcome::Conflict { remote }) => {
                operation.transition_to(OperationStatus::Conflict)?;
                if self.queue.update(operation.clone()) {
                    self.conflicts.write().insert(
                        operation.id,
                        ConflictRecord::new(
                            operation.id,
                            operation.device.clone(),
                            operation.payload.clone(),
                            remote,
                            self.clock.now_millis(),
                        ),
                    );
                    debug!(operation = %operation.id, "conflict detected");
                    result.conflicts.push(operation.id);
                } else {
                    debug!(operation = %operation.id, "cleared mid-dispatch, conflict dropped");
                }
            }
            Err(error) => {
                operation.retries += 1;
                operation.metadata.last_error = Some(error.to_string());
                if operation.retries >= operation.max_retries {
                    operation.transition_to(OperationStatus::Failed)?;
                    if self.queue.update(operation.clone()) {
                        warn!(
                            operation = %operation.id,
                            retries = operation.retries,
                            error = %error,
                            "operation failed, retry budget exhausted"
                        );
                        result.failed.push(FailedOperation {
                            id: operation.id,
                            error: error.to_string(),
                        });
                    }
                } else {
                    // Retried on a later pass, never within this one.
                    operation.transition_to(OperationStatus::Pending)?;
                    if self.queue.update(operation.clone()) {
                        debug!(
                            operation = %operation.id,
                            retries = operation.retries,
                            "transient failure, returned to pending"
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::transport::MockTransport;
    use driftq_core::{OperationDraft, OperationKind, Priority, DEFAULT_MAX_RETRIES};
    use serde_json::json;

    struct Fixture {
        coordinator: SyncCoordinator,
        queue: Arc<OperationQueue>,
        transport: Arc<MockTransport>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000));
        let events = Arc::new(EventFeed::new());
        let queue = Arc::new(OperationQueue::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            events.clone(),
            DEFAULT_MAX_RETRIES,
        ));
        let tracker = Arc::new(StatsTracker::new(queue.clone(), 100));
        let transport = Arc::new(MockTransport::new());
        let coordinator = SyncCoordinator::new(
            queue.clone(),
            transport.clone(),
            tracker,
            events,
            clock.clone(),
        );
        Fixture {
            coordinator,
            queue,
            transport,
            clock,
        }
    }

    fn draft(device: &DeviceKey) -> OperationDraft {
        OperationDraft::new(
            device.clone(),
            OperationKind::Write,
            "notes",
            json!({"v": 1}),
        )
    }

    #[test]
    fn successful_pass_empties_queue() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        let op = f.queue.enqueue(draft(&device)).unwrap();
        let result = f.coordinator.sync_device(&device).unwrap();

        assert_eq!(result.total, 1);
        assert_eq!(result.successful, vec![op.id]);
        assert!(result.failed.is_empty());
        assert!(result.conflicts.is_empty());
        assert!(f.queue.all(&device).is_empty());
    }

    #[test]
    fn priority_orders_dispatch() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        // Normal first in time, then high: high must still dispatch first.
        let normal = f.queue.enqueue(draft(&device)).unwrap();
        f.clock.advance(10);
        let high = f
            .queue
            .enqueue(draft(&device).with_priority(Priority::High))
            .unwrap();
        f.clock.advance(10);
        let low = f
            .queue
            .enqueue(draft(&device).with_priority(Priority::Low))
            .unwrap();

        f.coordinator.sync_device(&device).unwrap();
        assert_eq!(f.transport.executed(), vec![high.id, normal.id, low.id]);
    }

    #[test]
    fn equal_priority_dispatches_in_enqueue_order() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        let first = f.queue.enqueue(draft(&device)).unwrap();
        f.clock.advance(5);
        let second = f.queue.enqueue(draft(&device)).unwrap();

        f.coordinator.sync_device(&device).unwrap();
        assert_eq!(f.transport.executed(), vec![first.id, second.id]);
    }

    #[test]
    fn conflict_parks_operation_and_logs_record() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.transport.push_conflict(json!({"v": 2}));
        let op = f.queue.enqueue(draft(&device)).unwrap();

        let result = f.coordinator.sync_device(&device).unwrap();
        assert_eq!(result.conflicts, vec![op.id]);

        let stored = f.queue.get(&op.id).unwrap();
        assert_eq!(stored.status, OperationStatus::Conflict);

        let record = f.coordinator.conflict_record(&op.id).unwrap();
        assert_eq!(record.local, json!({"v": 1}));
        assert_eq!(record.remote, json!({"v": 2}));
        assert!(!record.is_resolved());
    }

    #[test]
    fn transient_failure_returns_to_pending() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.transport.push_failure("connection reset");
        let op = f.queue.enqueue(draft(&device)).unwrap();

        let result = f.coordinator.sync_device(&device).unwrap();
        assert!(result.failed.is_empty());
        assert!(result.successful.is_empty());

        let stored = f.queue.get(&op.id).unwrap();
        assert_eq!(stored.status, OperationStatus::Pending);
        assert_eq!(stored.retries, 1);
        assert!(stored.metadata.last_error.as_deref().unwrap().contains("connection reset"));
        // Not retried within the same pass.
        assert_eq!(f.transport.executed_count(), 1);
    }

    #[test]
    fn retry_budget_exhaustion_fails_operation() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.transport.fail_all("offline");
        let op = f.queue.enqueue(draft(&device)).unwrap();

        for _ in 0..(DEFAULT_MAX_RETRIES - 1) {
            let result = f.coordinator.sync_device(&device).unwrap();
            assert!(result.failed.is_empty());
        }

        let result = f.coordinator.sync_device(&device).unwrap();
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].id, op.id);

        let stored = f.queue.get(&op.id).unwrap();
        assert_eq!(stored.status, OperationStatus::Failed);
        assert_eq!(stored.retries, DEFAULT_MAX_RETRIES);

        // Failed is terminal: further passes attempt nothing.
        let after = f.coordinator.sync_device(&device).unwrap();
        assert_eq!(after.total, 0);
        assert_eq!(f.transport.executed_count(), DEFAULT_MAX_RETRIES as usize);
    }

    #[test]
    fn one_failure_does_not_abort_the_pass() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.transport.push_failure("connection reset");
        let failing = f.queue.enqueue(draft(&device)).unwrap();
        f.clock.advance(1);
        let succeeding = f.queue.enqueue(draft(&device)).unwrap();

        let result = f.coordinator.sync_device(&device).unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.successful, vec![succeeding.id]);
        assert_eq!(f.queue.get(&failing.id).unwrap().retries, 1);
    }

    #[test]
    fn resolve_conflict_merge() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.transport.push_conflict(json!({"a": 2, "b": {"x": 2, "y": 3}}));
        let op = f
            .queue
            .enqueue(OperationDraft::new(
                device.clone(),
                OperationKind::Update,
                "notes",
                json!({"a": 1, "b": {"x": 1}}),
            ))
            .unwrap();
        f.coordinator.sync_device(&device).unwrap();

        let record = f.coordinator.conflict_record(&op.id).unwrap();
        let resolved = f
            .coordinator
            .resolve_conflict(op.id, &record.local, &record.remote, ResolutionStrategy::Merge)
            .unwrap();
        assert_eq!(resolved, json!({"a": 1, "b": {"x": 1, "y": 3}}));

        assert_eq!(
            f.queue.get(&op.id).unwrap().status,
            OperationStatus::Resolved
        );
        let record = f.coordinator.conflict_record(&op.id).unwrap();
        assert!(record.is_resolved());
        assert_eq!(record.strategy, Some(ResolutionStrategy::Merge));
    }

    #[test]
    fn resolve_rejects_unknown_and_non_conflicted() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        let err = f
            .coordinator
            .resolve_conflict(Uuid::new_v4(), &json!({}), &json!({}), ResolutionStrategy::Remote)
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownOperation(_)));

        let op = f.queue.enqueue(draft(&device)).unwrap();
        let err = f
            .coordinator
            .resolve_conflict(op.id, &json!({}), &json!({}), ResolutionStrategy::Remote)
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidState { .. }));
    }

    #[test]
    fn second_pass_for_busy_device_is_refused() {
        use std::thread;
        use std::time::Duration;

        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.transport.set_delay(Duration::from_millis(250));
        f.queue.enqueue(draft(&device)).unwrap();

        let coordinator = Arc::new(f.coordinator);
        let background = {
            let coordinator = coordinator.clone();
            let device = device.clone();
            thread::spawn(move || coordinator.sync_device(&device))
        };

        // Give the background pass time to claim the slot.
        thread::sleep(Duration::from_millis(50));
        let second = coordinator.sync_device(&device);
        assert!(matches!(second, Err(SyncError::PassInFlight { .. })));

        let first = background.join().unwrap().unwrap();
        assert_eq!(first.successful.len(), 1);

        // Slot released: a new pass runs fine.
        assert!(coordinator.sync_device(&device).is_ok());
    }

    #[test]
    fn other_devices_are_not_blocked() {
        let f = fixture();
        let busy = DeviceKey::new("u1", "d1");
        let idle = DeviceKey::new("u1", "d2");

        // Claim the slot for `busy` by hand, then sync the other pair.
        let guard = f.coordinator.begin_pass(&busy).unwrap();
        assert!(f.coordinator.sync_device(&idle).is_ok());
        drop(guard);
        assert!(f.coordinator.sync_device(&busy).is_ok());
    }

    #[test]
    fn clear_during_pass_does_not_resurrect_operations() {
        use std::thread;
        use std::time::Duration;

        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.transport.set_delay(Duration::from_millis(200));
        f.transport.push_conflict(json!({"v": 2}));
        let op = f.queue.enqueue(draft(&device)).unwrap();

        let coordinator = Arc::new(f.coordinator);
        let background = {
            let coordinator = coordinator.clone();
            let device = device.clone();
            thread::spawn(move || coordinator.sync_device(&device))
        };

        // Clear while the transport call is still in flight.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(coordinator.clear_device(&device), 1);

        let result = background.join().unwrap().unwrap();
        assert!(result.conflicts.is_empty());
        assert!(f.queue.all(&device).is_empty());
        assert_eq!(coordinator.conflict_record(&op.id), None);
    }

    #[test]
    fn clear_drops_conflict_records_for_the_pair() {
        let f = fixture();
        let mine = DeviceKey::new("u1", "d1");
        let other = DeviceKey::new("u1", "d2");

        f.transport.push_conflict(json!({"v": 2}));
        let conflicted = f.queue.enqueue(draft(&mine)).unwrap();
        f.coordinator.sync_device(&mine).unwrap();

        f.transport.push_conflict(json!({"v": 3}));
        let kept = f.queue.enqueue(draft(&other)).unwrap();
        f.coordinator.sync_device(&other).unwrap();

        assert!(f.coordinator.conflict_record(&conflicted.id).is_some());
        f.coordinator.clear_device(&mine);

        assert_eq!(f.coordinator.conflict_record(&conflicted.id), None);
        assert!(f.coordinator.conflict_record(&kept.id).is_some());
    }

    #[test]
    fn undispatchable_operation_is_reported_not_propagated() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        // Force a status no dispatch can start from.
        let mut parked = f.queue.enqueue(draft(&device)).unwrap();
        parked.transition_to(OperationStatus::Syncing).unwrap();
        parked.transition_to(OperationStatus::Conflict).unwrap();
        f.queue.update(parked.clone());

        let mut result = SyncPassResult::default();
        f.coordinator.dispatch(parked.clone(), &mut result);

        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].id, parked.id);
        assert_eq!(f.transport.executed_count(), 0);

        // The pass machinery keeps working afterwards.
        let healthy = f.queue.enqueue(draft(&device)).unwrap();
        let pass = f.coordinator.sync_device(&device).unwrap();
        assert_eq!(pass.successful, vec![healthy.id]);
    }

    #[test]
    fn pass_appends_history_entry() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.queue.enqueue(draft(&device)).unwrap();
        f.clock.set(5_000);
        f.coordinator.sync_device(&device).unwrap();

        let history = f.coordinator.tracker.history(&device, 10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp_ms, 5_000);
        assert_eq!(history[0].total, 1);
        assert_eq!(history[0].successful, 1);
    }
}
