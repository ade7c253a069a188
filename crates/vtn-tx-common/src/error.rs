//! Error types for store transactions.

use thiserror::Error;

/// Result type alias for transaction operations.
pub type TxResult<T> = Result<T, TxError>;

/// Errors that abort a store transaction.
///
/// Any error returned from a task aborts the whole attempt: nothing the
/// task wrote becomes visible and registered hooks are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// The store no longer accepts transactions.
    #[error("Data store '{store}' is closed")]
    Closed {
        /// Store name.
        store: String,
    },

    /// Concurrent writers kept invalidating this transaction.
    #[error("Transaction on '{store}' failed after {attempts} conflicting attempts")]
    Conflict {
        /// Store name.
        store: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Reading from the store failed.
    #[error("Read failed at {path}: {reason}")]
    Read {
        /// Path of the data that could not be read.
        path: String,
        /// Error message.
        reason: String,
    },

    /// The task aborted the transaction.
    #[error("Transaction aborted: {reason}")]
    Aborted {
        /// Error message.
        reason: String,
    },
}

impl TxError {
    /// Creates a read error.
    pub fn read(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Read {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an abort error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Returns true if running the transaction again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TxError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_display() {
        let err = TxError::read("flows/vtn1", "device busy");
        assert_eq!(err.to_string(), "Read failed at flows/vtn1: device busy");

        let err = TxError::Conflict {
            store: "oper".to_string(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "Transaction on 'oper' failed after 3 conflicting attempts"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(TxError::Conflict {
            store: "oper".to_string(),
            attempts: 1
        }
        .is_retryable());
        assert!(!TxError::aborted("bug").is_retryable());
        assert!(!TxError::Closed {
            store: "oper".to_string()
        }
        .is_retryable());
    }
}
