//! Conflict records and payload resolution.

use crate::operation::DeviceKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Maximum nesting depth the recursive merge will descend.
///
/// `serde_json::Value` cannot be cyclic, so this is a cost bound for
/// pathological payloads, not cycle detection. Past the limit the local
/// side wins wholesale.
pub const MERGE_DEPTH_LIMIT: usize = 64;

/// How a conflicting local/remote payload pair is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Accept the remote payload verbatim. The default.
    #[default]
    Remote,
    /// Keep the local payload verbatim.
    Local,
    /// Structural merge; local wins on scalar disagreement.
    Merge,
}

impl ResolutionStrategy {
    /// Returns the wire name of this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::Remote => "remote",
            ResolutionStrategy::Local => "local",
            ResolutionStrategy::Merge => "merge",
        }
    }

    /// Parses a wire name into a strategy.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "remote" => Some(ResolutionStrategy::Remote),
            "local" => Some(ResolutionStrategy::Local),
            "merge" => Some(ResolutionStrategy::Merge),
            _ => None,
        }
    }
}

/// A recorded disagreement between a local operation and remote state.
///
/// Created only when a sync attempt reports a conflict; resolved only by an
/// explicit resolution call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// The conflicted operation.
    pub operation_id: Uuid,
    /// The pair that owns the conflicted operation. Clearing a pair's
    /// queue drops its records too.
    pub device: DeviceKey,
    /// The local payload at detection time.
    pub local: Value,
    /// The remote payload the server reported.
    pub remote: Value,
    /// Strategy applied, once resolved.
    pub strategy: Option<ResolutionStrategy>,
    /// When the conflict was detected (epoch milliseconds).
    pub detected_at_ms: u64,
    /// When the conflict was resolved, if it has been.
    pub resolved_at_ms: Option<u64>,
}

impl ConflictRecord {
    /// Creates an unresolved record.
    pub fn new(
        operation_id: Uuid,
        device: DeviceKey,
        local: Value,
        remote: Value,
        detected_at_ms: u64,
    ) -> Self {
        Self {
            operation_id,
            device,
            local,
            remote,
            strategy: None,
            detected_at_ms,
            resolved_at_ms: None,
        }
    }

    /// Marks the record resolved with the given strategy.
    pub fn mark_resolved(&mut self, strategy: ResolutionStrategy, resolved_at_ms: u64) {
        self.strategy = Some(strategy);
        self.resolved_at_ms = Some(resolved_at_ms);
    }

    /// Returns true if the record has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolved_at_ms.is_some()
    }
}

/// Resolves a conflicting payload pair according to a strategy.
///
/// - `Remote`: the remote payload verbatim.
/// - `Local`: the local payload verbatim.
/// - `Merge`: recursive structural merge. Keys present in both sides with
///   object values merge recursively; on scalar disagreement local wins;
///   keys only in remote are carried over; keys only in local are kept.
///   Arrays are treated as scalars: a conflicting local array replaces the
///   remote one.
pub fn resolve_payloads(strategy: ResolutionStrategy, local: &Value, remote: &Value) -> Value {
    match strategy {
        ResolutionStrategy::Remote => remote.clone(),
        ResolutionStrategy::Local => local.clone(),
        ResolutionStrategy::Merge => merge_values(local, remote, 0),
    }
}

fn merge_values(local: &Value, remote: &Value, depth: usize) -> Value {
    if depth >= MERGE_DEPTH_LIMIT {
        return local.clone();
    }

    match (local, remote) {
        (Value::Object(local_map), Value::Object(remote_map)) => {
            let mut out: Map<String, Value> = Map::new();

            // Remote keys first so keys missing locally carry over; local
            // insertions below overwrite on disagreement.
            for (key, remote_val) in remote_map {
                out.insert(key.clone(), remote_val.clone());
            }
            for (key, local_val) in local_map {
                let merged = match remote_map.get(key) {
                    Some(remote_val) => merge_values(local_val, remote_val, depth + 1),
                    None => local_val.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        // Scalars, arrays, and mixed shapes: local wins.
        _ => local.clone(),
    }
}
