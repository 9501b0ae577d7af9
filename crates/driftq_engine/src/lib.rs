//! # DriftQ Engine
//!
//! Offline mutation queue and sync engine.
//!
//! This crate provides:
//! - A durable, per-device queue of client mutations
//! - A sync coordinator that replays pending operations through an injected
//!   transport and classifies each outcome (synced / conflict / retry)
//! - An auto-sync scheduler with cancellable per-device tickers
//! - Per-device sync history and live status
//! - A fire-and-forget event feed for external subscribers
//!
//! ## Architecture
//!
//! A caller enqueues a mutation; the queue stores it with a checksum. A
//! sync pass, invoked directly or by the scheduler, selects the device's
//! pending operations, orders them by priority then enqueue time, and
//! dispatches each serially through the [`SyncTransport`]. Conflicts wait
//! for an explicit resolution call.
//!
//! ## Key Invariants
//!
//! - At most one sync pass runs per (user, device) pair at a time
//! - Within a pass, operations dispatch serially and in order
//! - A single operation's transient failure never aborts the pass
//! - Synced operations leave the queue; conflicted and failed ones remain
//!   queryable until cleared
//!
//! ## Usage
//!
//! ```
//! use driftq_core::{DeviceKey, OperationDraft, OperationKind};
//! use driftq_engine::{EngineConfig, MockTransport, SyncService};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(MockTransport::new());
//! let service = SyncService::in_memory(EngineConfig::default(), transport);
//!
//! let device = DeviceKey::new("user-1", "laptop");
//! let draft = OperationDraft::new(
//!     device.clone(),
//!     OperationKind::Write,
//!     "notes",
//!     json!({"title": "offline edit"}),
//! );
//! service.queue_operation(draft).unwrap();
//!
//! let result = service.sync_operations(&device).unwrap();
//! assert_eq!(result.successful.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod coordinator;
mod error;
mod events;
mod queue;
mod scheduler;
mod service;
mod store;
mod tracker;
mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use coordinator::{FailedOperation, SyncCoordinator, SyncPassResult};
pub use error::{SyncError, SyncResult};
pub use events::{EventFeed, SyncEvent};
pub use queue::OperationQueue;
pub use scheduler::{AutoSyncConfig, AutoSyncScheduler};
pub use service::SyncService;
pub use store::{MemoryStore, QueueStore};
pub use tracker::{HistoryEntry, StatsTracker, SyncStatus};
pub use transport::{DispatchOutcome, MockTransport, SyncTransport};
