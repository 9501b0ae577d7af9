//! The public service facade.

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::coordinator::{SyncCoordinator, SyncPassResult};
use crate::error::SyncResult;
use crate::events::{EventFeed, SyncEvent};
use crate::queue::OperationQueue;
use crate::scheduler::{AutoSyncConfig, AutoSyncScheduler};
use crate::store::{MemoryStore, QueueStore};
use crate::tracker::{HistoryEntry, StatsTracker, SyncStatus};
use crate::transport::SyncTransport;
use driftq_codec::{compress, decompress, Compressed};
use driftq_core::{
    ConflictRecord, DeviceKey, Operation, OperationDraft, ResolutionStrategy,
};
use serde_json::Value;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// The offline sync service.
///
/// An explicit value constructed from injected collaborators (transport,
/// store, clock) rather than a process-wide singleton. All methods take
/// `&self`; the service is `Send + Sync` and can be shared behind an `Arc`.
pub struct SyncService {
    queue: Arc<OperationQueue>,
    coordinator: Arc<SyncCoordinator>,
    scheduler: AutoSyncScheduler,
    tracker: Arc<StatsTracker>,
    events: Arc<EventFeed>,
    clock: Arc<dyn Clock>,
}

impl SyncService {
    /// Creates a service from injected collaborators.
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn SyncTransport>,
        store: Arc<dyn QueueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = Arc::new(EventFeed::new());
        let queue = Arc::new(OperationQueue::new(
            store,
            clock.clone(),
            events.clone(),
            config.default_max_retries,
        ));
        let tracker = Arc::new(StatsTracker::new(queue.clone(), config.history_limit));
        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            transport,
            tracker.clone(),
            events.clone(),
            clock.clone(),
        ));
        let scheduler = AutoSyncScheduler::new(coordinator.clone());

        Self {
            queue,
            coordinator,
            scheduler,
            tracker,
            events,
            clock,
        }
    }

    /// Creates a service over an in-memory store and the system clock.
    pub fn in_memory(config: EngineConfig, transport: Arc<dyn SyncTransport>) -> Self {
        Self::new(
            config,
            transport,
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Validates and enqueues a mutation for later synchronization.
    pub fn queue_operation(&self, draft: OperationDraft) -> SyncResult<Operation> {
        self.queue.enqueue(draft)
    }

    /// Runs one sync pass for a device pair.
    pub fn sync_operations(&self, device: &DeviceKey) -> SyncResult<SyncPassResult> {
        self.coordinator.sync_device(device)
    }

    /// Lists the pending operations for a device pair, in dispatch order.
    pub fn get_pending_operations(&self, device: &DeviceKey) -> Vec<Operation> {
        let mut pending = self.queue.pending(device);
        pending.sort_by_key(|op| (op.priority.rank(), op.metadata.queued_at_ms, op.sequence));
        pending
    }

    /// Fetches an operation by id, whatever its status.
    pub fn get_operation(&self, id: &Uuid) -> Option<Operation> {
        self.queue.get(id)
    }

    /// Compresses a payload for transfer. Lossy: null members are dropped.
    pub fn compress_data(&self, value: &Value) -> SyncResult<Compressed> {
        Ok(compress(value)?)
    }

    /// Decompresses a previously compressed payload.
    pub fn decompress_data(&self, encoded: &str) -> SyncResult<Value> {
        Ok(decompress(encoded)?)
    }

    /// Resolves a conflicted operation; returns the resolved payload.
    pub fn resolve_conflict(
        &self,
        operation_id: Uuid,
        local: &Value,
        remote: &Value,
        strategy: ResolutionStrategy,
    ) -> SyncResult<Value> {
        self.coordinator
            .resolve_conflict(operation_id, local, remote, strategy)
    }

    /// Fetches the conflict record for an operation, if one exists.
    pub fn get_conflict(&self, operation_id: &Uuid) -> Option<ConflictRecord> {
        self.coordinator.conflict_record(operation_id)
    }

    /// Returns up to `limit` pass summaries, most recent first.
    pub fn get_sync_history(&self, device: &DeviceKey, limit: usize) -> Vec<HistoryEntry> {
        self.tracker.history(device, limit)
    }

    /// Computes the live status for a device pair.
    pub fn get_sync_status(&self, device: &DeviceKey) -> SyncStatus {
        self.tracker.status(device)
    }

    /// Removes every queued operation and conflict record for a device
    /// pair. Irreversible; history is retained.
    pub fn clear_queue(&self, device: &DeviceKey) -> usize {
        self.coordinator.clear_device(device)
    }

    /// Starts (or replaces) periodic sync for a device pair.
    pub fn enable_auto_sync(&self, device: &DeviceKey, interval: Duration) {
        self.scheduler
            .enable(device, interval, self.clock.now_millis());
    }

    /// Stops periodic sync for a device pair. Returns true if it was active.
    pub fn disable_auto_sync(&self, device: &DeviceKey) -> bool {
        self.scheduler.disable(device)
    }

    /// Returns the auto-sync settings for a device pair, if active.
    pub fn auto_sync_config(&self, device: &DeviceKey) -> Option<AutoSyncConfig> {
        self.scheduler.config(device)
    }

    /// Subscribes to engine notifications.
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        self.events.subscribe()
    }
}
