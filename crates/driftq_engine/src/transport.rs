//! Transport layer abstraction.

use crate::error::{SyncError, SyncResult};
use driftq_core::Operation;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

/// The outcome of dispatching one operation to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The server applied the mutation.
    Applied,
    /// The server holds a conflicting payload; the operation must wait for
    /// explicit resolution.
    Conflict {
        /// The server's payload at conflict time.
        remote: Value,
    },
}

/// A sync transport dispatches single operations to the server.
///
/// This trait abstracts the wire protocol, allowing different
/// implementations (HTTP, GraphQL, mock for testing, etc.). The engine
/// never sees transport details.
///
/// A transient failure is an `Err` with `retryable = true`; the coordinator
/// retries it on a later pass, up to the operation's budget.
pub trait SyncTransport: Send + Sync {
    /// Dispatches one operation.
    fn execute(&self, operation: &Operation) -> SyncResult<DispatchOutcome>;
}

/// A scripted response for [`MockTransport`].
#[derive(Debug, Clone)]
enum MockResponse {
    Applied,
    Conflict(Value),
    Fail(String),
}

/// A mock transport for tests.
///
/// Responses are scripted in FIFO order; once the script is exhausted every
/// call succeeds with [`DispatchOutcome::Applied`]. Executed operation ids
/// are recorded in dispatch order.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockResponse>>,
    executed: Mutex<Vec<Uuid>>,
    delay: Mutex<Option<Duration>>,
    fail_all: Mutex<Option<String>>,
}

impl MockTransport {
    /// Creates a transport that applies everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful application for the next unscripted call.
    pub fn push_applied(&self) {
        self.script.lock().push_back(MockResponse::Applied);
    }

    /// Scripts a conflict carrying the given remote payload.
    pub fn push_conflict(&self, remote: Value) {
        self.script.lock().push_back(MockResponse::Conflict(remote));
    }

    /// Scripts a retryable transport failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script.lock().push_back(MockResponse::Fail(message.into()));
    }

    /// Makes every call fail with a retryable error, regardless of script.
    pub fn fail_all(&self, message: impl Into<String>) {
        *self.fail_all.lock() = Some(message.into());
    }

    /// Sleeps for `delay` inside every `execute` call.
    ///
    /// Used to hold a pass open while a test exercises the single-flight guard.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Returns the ids of every executed operation, in dispatch order.
    pub fn executed(&self) -> Vec<Uuid> {
        self.executed.lock().clone()
    }

    /// Returns how many dispatches this transport has seen.
    pub fn executed_count(&self) -> usize {
        self.executed.lock().len()
    }
}

impl SyncTransport for MockTransport {
    fn execute(&self, operation: &Operation) -> SyncResult<DispatchOutcome> {
        self.executed.lock().push(operation.id);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if let Some(message) = self.fail_all.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }

        match self.script.lock().pop_front() {
            Some(MockResponse::Applied) | None => Ok(DispatchOutcome::Applied),
            Some(MockResponse::Conflict(remote)) => Ok(DispatchOutcome::Conflict { remote }),
            Some(MockResponse::Fail(message)) => Err(SyncError::transport_retryable(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftq_core::{DeviceKey, OperationKind, OperationMetadata, OperationStatus, Priority};
    use serde_json::json;

    fn make_operation() -> Operation {
        Operation {
            id: Uuid::new_v4(),
            device: DeviceKey::new("u1", "d1"),
            kind: OperationKind::Write,
            resource: "notes".into(),
            resource_id: None,
            payload: json!({}),
            checksum: String::new(),
            priority: Priority::Normal,
            dependencies: Vec::new(),
            status: OperationStatus::Pending,
            retries: 0,
            max_retries: 3,
            sequence: 1,
            metadata: OperationMetadata::default(),
        }
    }

    #[test]
    fn default_outcome_is_applied() {
        let transport = MockTransport::new();
        let op = make_operation();
        assert_eq!(transport.execute(&op).unwrap(), DispatchOutcome::Applied);
        assert_eq!(transport.executed(), vec![op.id]);
    }

    #[test]
    fn script_runs_in_order() {
        let transport = MockTransport::new();
        transport.push_conflict(json!({"v": 2}));
        transport.push_failure("offline");

        let op = make_operation();
        assert_eq!(
            transport.execute(&op).unwrap(),
            DispatchOutcome::Conflict { remote: json!({"v": 2}) }
        );
        assert!(matches!(
            transport.execute(&op),
            Err(SyncError::Transport { retryable: true, .. })
        ));
        // Script exhausted: back to applied.
        assert_eq!(transport.execute(&op).unwrap(), DispatchOutcome::Applied);
    }

    #[test]
    fn fail_all_overrides_script() {
        let transport = MockTransport::new();
        transport.push_applied();
        transport.fail_all("network down");

        let op = make_operation();
        assert!(transport.execute(&op).is_err());
        assert_eq!(transport.executed_count(), 1);
    }
}
