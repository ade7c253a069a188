//! Error types for flow removal.

use crate::flow::FlowId;
use crate::rpc::RemoveFlowInput;
use std::fmt;
use thiserror::Error;
use vtn_tx_common::TxError;

/// Result type alias for flow manager operations.
pub type FlowResult<T> = std::result::Result<T, FlowError>;

/// Failure of a single switch RPC.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The RPC did not complete before the removal deadline.
    #[error("timed out")]
    Timeout,

    /// The switch answered with an error.
    #[error("rejected by switch: {0}")]
    Rejected(String),

    /// The switch could not be reached.
    #[error("switch unreachable: {0}")]
    Unreachable(String),

    /// The RPC was never dispatched because the executor shut down.
    #[error("cancelled")]
    Cancelled,
}

impl RpcError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }
}

/// A failed RPC together with the request that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcFailure {
    pub input: RemoveFlowInput,
    pub reason: RpcError,
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.input, self.reason)
    }
}

/// Errors reported by the flow removal pipeline.
///
/// Store errors abort the removal before anything is committed and are
/// returned to the caller directly. RPC errors are reported only through
/// the removal's completion handle; the store deletion stays committed.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Store transaction failed.
    #[error("Store error: {0}")]
    Store(#[from] TxError),

    /// One or more switch RPCs failed or timed out.
    #[error("{} of {total} flow removal RPCs failed: {}", .failures.len(), join(.failures))]
    RpcFailed {
        /// Number of RPCs dispatched.
        total: usize,
        /// RPCs that failed.
        failures: Vec<RpcFailure>,
    },

    /// A flow with the same identifier already exists.
    #[error("Duplicate flow ID: {0}")]
    DuplicateFlow(FlowId),

    /// The identifier does not fit in a VTN cookie.
    #[error("Flow ID out of range: {0}")]
    FlowIdOutOfRange(FlowId),

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The removal was cancelled before it completed.
    #[error("Flow removal cancelled: {0}")]
    Cancelled(String),

    /// The executor was shut down.
    #[error("Flow remove executor is shut down")]
    ExecutorShutdown,
}

fn join(failures: &[RpcFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl FlowError {
    /// Creates a configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Returns true if triggering the same removal again may succeed.
    ///
    /// Optimistic-lock conflicts and RPC failures are transient; the store
    /// is the source of truth, so re-issuing a removal is always safe.
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::Store(e) => e.is_retryable(),
            FlowError::RpcFailed { .. } => true,
            _ => false,
        }
    }

    /// Returns the failed RPCs, if this is an RPC failure.
    pub fn rpc_failures(&self) -> &[RpcFailure] {
        match self {
            FlowError::RpcFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtn_types::SalNode;

    #[test]
    fn test_rpc_failed_display() {
        let err = FlowError::RpcFailed {
            total: 3,
            failures: vec![RpcFailure {
                input: RemoveFlowInput::table(SalNode::new(5), 0),
                reason: RpcError::Timeout,
            }],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("1 of 3 flow removal RPCs failed"), "{}", msg);
        assert!(msg.contains("openflow:5"), "{}", msg);
        assert!(msg.contains("timed out"), "{}", msg);
        assert_eq!(err.rpc_failures().len(), 1);
    }

    #[test]
    fn test_is_retryable() {
        let conflict = FlowError::from(TxError::Conflict {
            store: "flows".to_string(),
            attempts: 3,
        });
        assert!(conflict.is_retryable());
        assert!(!FlowError::from(TxError::aborted("x")).is_retryable());
        assert!(!FlowError::ExecutorShutdown.is_retryable());
        assert!(!FlowError::invalid_config("bad").is_retryable());
    }
}
