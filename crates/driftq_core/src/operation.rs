//! Queued operations and their status state machine.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Default number of transport attempts before an operation is failed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The kind of mutation an operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a new resource.
    Write,
    /// Replace an existing resource.
    Update,
    /// Delete a resource.
    Delete,
    /// Partially modify a resource.
    Patch,
}

impl OperationKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Write => "write",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Patch => "patch",
        }
    }

    /// Parses a wire name into a kind.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "write" => Some(OperationKind::Write),
            "update" => Some(OperationKind::Update),
            "delete" => Some(OperationKind::Delete),
            "patch" => Some(OperationKind::Patch),
            _ => None,
        }
    }
}

/// Dispatch priority of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Attempted before normal and low operations in every pass.
    High,
    /// The default priority.
    #[default]
    Normal,
    /// Attempted after high and normal operations.
    Low,
}

impl Priority {
    /// Returns the sort rank: high sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

/// The lifecycle status of an operation.
///
/// ```text
/// pending → syncing → {synced | conflict | failed}
///     ↑        │
///     └────────┘  (transient failure with retries left)
/// conflict → resolved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting for a sync pass.
    Pending,
    /// Currently dispatched to the transport.
    Syncing,
    /// Applied by the server and removed from the queue.
    Synced,
    /// Server reported a conflicting remote payload; awaiting resolution.
    Conflict,
    /// Retries exhausted; surfaced to the caller as actionable.
    Failed,
    /// Conflict explicitly resolved.
    Resolved,
}

impl OperationStatus {
    /// Returns true if this status permits a transition to `next`.
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, next),
            (Pending, Syncing)
                | (Syncing, Synced)
                | (Syncing, Conflict)
                | (Syncing, Failed)
                | (Syncing, Pending)
                | (Conflict, Resolved)
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Synced | OperationStatus::Failed | OperationStatus::Resolved
        )
    }

    /// Returns the wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Syncing => "syncing",
            OperationStatus::Synced => "synced",
            OperationStatus::Conflict => "conflict",
            OperationStatus::Failed => "failed",
            OperationStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The partition key that scopes all queue and history state.
///
/// Kept as a typed pair rather than a concatenated string so store keys
/// cannot collide on separator characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey {
    /// Owning user.
    pub user_id: String,
    /// Owning device.
    pub device_id: String,
}

impl DeviceKey {
    /// Creates a new device key.
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.device_id)
    }
}

/// Bookkeeping the coordinator maintains on an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// When the operation was enqueued (epoch milliseconds).
    pub queued_at_ms: u64,
    /// When the transport last attempted it.
    pub attempted_at_ms: Option<u64>,
    /// Message of the last transport error, if any.
    pub last_error: Option<String>,
}

/// A queued client mutation awaiting synchronization.
///
/// `payload` and `checksum` are fixed at enqueue time; only `status`,
/// `retries`, and `metadata` are mutated afterwards, and only by the
/// coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identifier, assigned at enqueue time.
    pub id: Uuid,
    /// Owning partition.
    pub device: DeviceKey,
    /// Kind of mutation.
    pub kind: OperationKind,
    /// Target resource (collection) name.
    pub resource: String,
    /// Target resource instance, if the mutation addresses one.
    pub resource_id: Option<String>,
    /// Mutation content. Immutable once enqueued.
    pub payload: Value,
    /// Integrity fingerprint of `payload`, computed once at enqueue.
    pub checksum: String,
    /// Dispatch priority.
    pub priority: Priority,
    /// Operation ids that should be synced first. Advisory only: recorded
    /// and surfaced, but ordering remains priority + enqueue time.
    pub dependencies: Vec<Uuid>,
    /// Lifecycle status.
    pub status: OperationStatus,
    /// Transport attempts made so far.
    pub retries: u32,
    /// Attempts allowed before the operation is failed.
    pub max_retries: u32,
    /// Queue-assigned sequence, the stable tie-break within a priority.
    pub sequence: u64,
    /// Coordinator bookkeeping.
    pub metadata: OperationMetadata,
}

impl Operation {
    /// Returns true if another transport attempt is allowed.
    pub fn has_retries_left(&self) -> bool {
        self.retries < self.max_retries
    }

    /// Applies a status transition, rejecting illegal ones.
    pub fn transition_to(&mut self, next: OperationStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Caller-supplied input for enqueueing an operation.
///
/// Everything the queue assigns itself (id, checksum, sequence, status,
/// timestamps) is absent here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDraft {
    /// Owning partition.
    pub device: DeviceKey,
    /// Kind of mutation.
    pub kind: OperationKind,
    /// Target resource name.
    pub resource: String,
    /// Target resource instance, if any.
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Mutation content.
    pub payload: Value,
    /// Dispatch priority. Defaults to normal.
    #[serde(default)]
    pub priority: Priority,
    /// Advisory dependency ids.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    /// Override for the retry budget. Defaults to [`DEFAULT_MAX_RETRIES`].
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl OperationDraft {
    /// Creates a draft with the mandatory fields and defaults elsewhere.
    pub fn new(
        device: DeviceKey,
        kind: OperationKind,
        resource: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            device,
            kind,
            resource: resource.into(),
            resource_id: None,
            payload,
            priority: Priority::default(),
            dependencies: Vec::new(),
            max_retries: None,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the target resource instance.
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Sets the advisory dependencies.
    pub fn with_dependencies(mut self, dependencies: Vec<Uuid>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Validates the mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidOperation`] when the resource or either
    /// half of the device key is empty.
    pub fn validate(&self) -> ModelResult<()> {
        if self.resource.trim().is_empty() {
            return Err(ModelError::invalid_operation("resource must not be empty"));
        }
        if self.device.user_id.trim().is_empty() {
            return Err(ModelError::invalid_operation("user id must not be empty"));
        }
        if self.device.device_id.trim().is_empty() {
            return Err(ModelError::invalid_operation("device id must not be empty"));
        }
        Ok(())
    }
}
