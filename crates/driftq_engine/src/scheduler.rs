//! Periodic auto-sync with cancellable per-device tickers.

use crate::coordinator::SyncCoordinator;
use crate::error::SyncError;
use driftq_core::DeviceKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// How often a sleeping ticker re-checks its cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// The auto-sync settings for one device pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSyncConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Whether the ticker is currently active.
    pub enabled: bool,
    /// When the ticker was started (epoch milliseconds).
    pub started_at_ms: u64,
}

struct Ticker {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    config: AutoSyncConfig,
}

impl Ticker {
    fn cancel(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        // The thread observes the flag within one poll interval; it is not
        // joined here because it may be mid-pass, and cancellation never
        // interrupts an in-flight pass.
        self.handle.take();
    }
}

/// Triggers periodic sync passes per device pair.
///
/// At most one ticker exists per pair; enabling a pair that already has
/// one replaces it. A tick that lands while a pass for the pair is still
/// in flight is skipped, never queued, so two passes can never overlap.
/// Cancellation affects future ticks only.
pub struct AutoSyncScheduler {
    coordinator: Arc<SyncCoordinator>,
    tickers: Mutex<HashMap<DeviceKey, Ticker>>,
}

impl AutoSyncScheduler {
    /// Creates a scheduler over the given coordinator.
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        Self {
            coordinator,
            tickers: Mutex::new(HashMap::new()),
        }
    }

    /// Starts (or replaces) the periodic ticker for a device pair.
    pub fn enable(&self, device: &DeviceKey, interval: Duration, started_at_ms: u64) {
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = {
            let cancel = cancel.clone();
            let coordinator = self.coordinator.clone();
            let device = device.clone();
            thread::spawn(move || run_ticker(&coordinator, &device, interval, &cancel))
        };

        let config = AutoSyncConfig {
            interval,
            enabled: true,
            started_at_ms,
        };

        let mut tickers = self.tickers.lock();
        if let Some(mut previous) = tickers.insert(
            device.clone(),
            Ticker {
                cancel,
                handle: Some(handle),
                config,
            },
        ) {
            previous.cancel();
        }
        debug!(device = %device, ?interval, "auto-sync enabled");
    }

    /// Cancels the ticker for a device pair. Returns true if one existed.
    ///
    /// An in-flight pass is never interrupted; only future ticks stop.
    pub fn disable(&self, device: &DeviceKey) -> bool {
        let removed = self.tickers.lock().remove(device);
        match removed {
            Some(mut ticker) => {
                ticker.cancel();
                debug!(device = %device, "auto-sync disabled");
                true
            }
            None => false,
        }
    }

    /// Returns the active configuration for a device pair, if any.
    pub fn config(&self, device: &DeviceKey) -> Option<AutoSyncConfig> {
        self.tickers.lock().get(device).map(|t| t.config.clone())
    }

    /// Returns the number of active tickers.
    pub fn active_count(&self) -> usize {
        self.tickers.lock().len()
    }
}

impl Drop for AutoSyncScheduler {
    fn drop(&mut self) {
        for (_, ticker) in self.tickers.lock().iter_mut() {
            ticker.cancel();
        }
    }
}

fn run_ticker(
    coordinator: &SyncCoordinator,
    device: &DeviceKey,
    interval: Duration,
    cancel: &AtomicBool,
) {
    loop {
        // Sleep the interval in short slices so disable takes effect promptly.
        let mut slept = Duration::ZERO;
        while slept < interval {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            let slice = CANCEL_POLL.min(interval - slept);
            thread::sleep(slice);
            slept += slice;
        }

        if cancel.load(Ordering::SeqCst) {
            return;
        }

        match coordinator.sync_device(device) {
            Ok(_) => {}
            Err(SyncError::PassInFlight { .. }) => {
                // A direct call or a previous tick is still running.
                debug!(device = %device, "auto-sync tick skipped, pass in flight");
            }
            Err(error) => {
                warn!(device = %device, error = %error, "auto-sync pass failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::EventFeed;
    use crate::queue::OperationQueue;
    use crate::store::MemoryStore;
    use crate::tracker::StatsTracker;
    use crate::transport::MockTransport;
    use driftq_core::{OperationDraft, OperationKind, DEFAULT_MAX_RETRIES};
    use serde_json::json;

    struct Fixture {
        scheduler: AutoSyncScheduler,
        queue: Arc<OperationQueue>,
        transport: Arc<MockTransport>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let events = Arc::new(EventFeed::new());
        let queue = Arc::new(OperationQueue::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            events.clone(),
            DEFAULT_MAX_RETRIES,
        ));
        let tracker = Arc::new(StatsTracker::new(queue.clone(), 100));
        let transport = Arc::new(MockTransport::new());
        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            transport.clone(),
            tracker,
            events,
            clock,
        ));
        Fixture {
            scheduler: AutoSyncScheduler::new(coordinator),
            queue,
            transport,
        }
    }

    #[test]
    fn ticker_runs_passes() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.queue
            .enqueue(OperationDraft::new(
                device.clone(),
                OperationKind::Write,
                "notes",
                json!({}),
            ))
            .unwrap();

        f.scheduler.enable(&device, Duration::from_millis(20), 0);
        // Wait for at least one tick.
        std::thread::sleep(Duration::from_millis(120));
        f.scheduler.disable(&device);

        assert_eq!(f.transport.executed_count(), 1);
        assert!(f.queue.all(&device).is_empty());
    }

    #[test]
    fn enable_replaces_existing_ticker() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.scheduler.enable(&device, Duration::from_secs(60), 10);
        f.scheduler.enable(&device, Duration::from_secs(30), 20);

        assert_eq!(f.scheduler.active_count(), 1);
        let config = f.scheduler.config(&device).unwrap();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.started_at_ms, 20);
    }

    #[test]
    fn disable_reports_existence() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        assert!(!f.scheduler.disable(&device));
        f.scheduler.enable(&device, Duration::from_secs(60), 0);
        assert!(f.scheduler.disable(&device));
        assert_eq!(f.scheduler.active_count(), 0);
        assert_eq!(f.scheduler.config(&device), None);
    }

    #[test]
    fn disabled_ticker_stops_syncing() {
        let f = fixture();
        let device = DeviceKey::new("u1", "d1");

        f.scheduler.enable(&device, Duration::from_millis(20), 0);
        f.scheduler.disable(&device);
        // The cancel flag is observed within one poll slice; after that no
        // tick can fire.
        std::thread::sleep(Duration::from_millis(120));

        f.queue
            .enqueue(OperationDraft::new(
                device.clone(),
                OperationKind::Write,
                "notes",
                json!({}),
            ))
            .unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(f.transport.executed_count(), 0);
    }
}
