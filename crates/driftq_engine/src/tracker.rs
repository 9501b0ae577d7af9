//! Per-device sync history and live status.

use crate::queue::OperationQueue;
use driftq_core::{DeviceKey, OperationStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One sync pass, summarized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the pass finished (epoch milliseconds).
    pub timestamp_ms: u64,
    /// Operations attempted.
    pub total: usize,
    /// Operations synced and removed.
    pub successful: usize,
    /// Operations that exhausted their retry budget this pass.
    pub failed: usize,
    /// Operations that entered conflict this pass.
    pub conflicts: usize,
}

/// Live queue status for a device pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Operations waiting for a pass.
    pub pending: usize,
    /// Operations awaiting conflict resolution.
    pub conflicts: usize,
    /// Operations currently dispatched.
    pub syncing: usize,
    /// Finish time of the most recent pass, if any.
    pub last_sync_ms: Option<u64>,
    /// Total operations held for the pair, regardless of status.
    pub queue_size: usize,
}

/// Records pass history and answers live status queries.
///
/// History is bounded per device pair; the oldest entries are dropped
/// first. Status is always computed live from the queue, never cached.
pub struct StatsTracker {
    queue: Arc<OperationQueue>,
    history: RwLock<HashMap<DeviceKey, Vec<HistoryEntry>>>,
    history_limit: usize,
}

impl StatsTracker {
    /// Creates a tracker over the given queue.
    pub fn new(queue: Arc<OperationQueue>, history_limit: usize) -> Self {
        Self {
            queue,
            history: RwLock::new(HashMap::new()),
            history_limit,
        }
    }

    /// Appends one pass summary for a device pair.
    pub fn record(&self, device: &DeviceKey, entry: HistoryEntry) {
        let mut history = self.history.write();
        let entries = history.entry(device.clone()).or_default();
        entries.push(entry);
        if entries.len() > self.history_limit {
            let excess = entries.len() - self.history_limit;
            entries.drain(0..excess);
        }
    }

    /// Returns up to `limit` history entries, most recent first.
    pub fn history(&self, device: &DeviceKey, limit: usize) -> Vec<HistoryEntry> {
        let history = self.history.read();
        let Some(entries) = history.get(device) else {
            return Vec::new();
        };
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Computes the live status for a device pair.
    pub fn status(&self, device: &DeviceKey) -> SyncStatus {
        let operations = self.queue.all(device);
        let count = |status: OperationStatus| {
            operations.iter().filter(|op| op.status == status).count()
        };

        SyncStatus {
            pending: count(OperationStatus::Pending),
            conflicts: count(OperationStatus::Conflict),
            syncing: count(OperationStatus::Syncing),
            last_sync_ms: self
                .history
                .read()
                .get(device)
                .and_then(|entries| entries.last())
                .map(|entry| entry.timestamp_ms),
            queue_size: operations.len(),
        }
    }

    /// Removes all queue entries for a device pair. Irreversible.
    ///
    /// History is retained; only the queue is cleared.
    pub fn clear(&self, device: &DeviceKey) -> usize {
        self.queue.clear(device)
    }
}
