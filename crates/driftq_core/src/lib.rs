//! # DriftQ Core
//!
//! The operation data model for DriftQ.
//!
//! This crate provides:
//! - The [`Operation`] type: a queued client mutation awaiting sync
//! - The status state machine (pending → syncing → synced/conflict/failed)
//! - Conflict records and payload resolution strategies
//!
//! ## Key Invariants
//!
//! - An operation's payload and checksum are immutable once enqueued
//! - Status transitions follow the state machine; illegal transitions are
//!   rejected, never silently applied
//! - All queue state is partitioned by [`DeviceKey`] (user + device)
//!
//! The crate is pure data: no I/O, no clocks, no locks. The engine crate
//! wires it to a transport and a store.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod operation;

pub use conflict::{resolve_payloads, ConflictRecord, ResolutionStrategy, MERGE_DEPTH_LIMIT};
pub use error::{ModelError, ModelResult};
pub use operation::{
    DeviceKey, Operation, OperationDraft, OperationKind, OperationMetadata, OperationStatus,
    Priority, DEFAULT_MAX_RETRIES,
};
