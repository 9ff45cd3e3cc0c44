//! Transaction Error Types
//!
//! Every failure of the session transaction core is a local, synchronous
//! error returned to the statement that triggered it. None are swallowed.
//!
//! Exactly one kind is retryable: `RetryableConflict`. Clients and automatic
//! retry loops key off `TxnError::is_retryable`, never off message text.

use thiserror::Error;

use super::record::TxnId;

/// Transaction error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnErrorKind {
    /// BEGIN while a transaction is already open
    TransactionAlreadyOpen,

    /// Operation not legal in the current transaction state
    InvalidTransactionState,

    /// Isolation level name not recognized
    UnknownIsolationLevel,

    /// User priority name not recognized
    UnknownPriority,

    /// Transaction lost a conflict and must be re-executed
    RetryableConflict,

    /// Retry budget exhausted
    TransactionRetryLimitExceeded,

    /// Privileged operation invoked without privilege
    InsufficientPrivilege,

    /// Malformed argument to a debug function
    SyntaxError,

    /// Error armed through the debug gateway
    Injected,

    /// Non-retryable failure reported by the KV layer
    StorageFailure,
}

impl TxnErrorKind {
    /// Stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransactionAlreadyOpen => "AERO_TXN_ALREADY_OPEN",
            Self::InvalidTransactionState => "AERO_TXN_INVALID_STATE",
            Self::UnknownIsolationLevel => "AERO_TXN_UNKNOWN_ISOLATION",
            Self::UnknownPriority => "AERO_TXN_UNKNOWN_PRIORITY",
            Self::RetryableConflict => "AERO_TXN_RETRYABLE_CONFLICT",
            Self::TransactionRetryLimitExceeded => "AERO_TXN_RETRY_LIMIT_EXCEEDED",
            Self::InsufficientPrivilege => "AERO_TXN_INSUFFICIENT_PRIVILEGE",
            Self::SyntaxError => "AERO_TXN_SYNTAX_ERROR",
            Self::Injected => "AERO_TXN_INJECTED",
            Self::StorageFailure => "AERO_TXN_STORAGE_FAILURE",
        }
    }

    /// SQLSTATE reported to SQL clients.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            Self::TransactionAlreadyOpen => "25001",
            Self::InvalidTransactionState => "25000",
            Self::UnknownIsolationLevel => "22023",
            Self::UnknownPriority => "22023",
            Self::RetryableConflict => "40001",
            Self::TransactionRetryLimitExceeded => "40003",
            Self::InsufficientPrivilege => "42501",
            Self::SyntaxError => "42601",
            Self::Injected => "XX000",
            Self::StorageFailure => "XX000",
        }
    }
}

/// Transaction error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}", code = .kind.code())]
pub struct TxnError {
    /// Error kind
    pub kind: TxnErrorKind,
    /// Error message
    pub message: String,
    /// Winning transaction, for retryable conflicts caused by contention
    pub winner: Option<TxnId>,
    /// Error-code tag supplied to an injected error
    pub tag: Option<String>,
}

impl TxnError {
    /// Create a new transaction error.
    pub fn new(kind: TxnErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            winner: None,
            tag: None,
        }
    }

    /// BEGIN while a transaction is open.
    pub fn already_open() -> Self {
        Self::new(
            TxnErrorKind::TransactionAlreadyOpen,
            "there is already a transaction in progress; COMMIT or ROLLBACK first",
        )
    }

    /// Operation illegal in the current state.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(TxnErrorKind::InvalidTransactionState, message)
    }

    /// Unrecognized isolation level name.
    pub fn unknown_isolation(name: &str) -> Self {
        Self::new(
            TxnErrorKind::UnknownIsolationLevel,
            format!("unknown isolation level: {}", name),
        )
    }

    /// Unrecognized user priority name.
    pub fn unknown_priority(name: &str) -> Self {
        Self::new(
            TxnErrorKind::UnknownPriority,
            format!("unknown user priority: {}", name),
        )
    }

    /// Lost a conflict. `winner` is `None` for forced retries.
    pub fn retryable(message: impl Into<String>, winner: Option<TxnId>) -> Self {
        let mut err = Self::new(TxnErrorKind::RetryableConflict, message);
        err.winner = winner;
        err
    }

    /// Retry budget exhausted.
    pub fn retry_limit_exceeded(retries: u32) -> Self {
        Self::new(
            TxnErrorKind::TransactionRetryLimitExceeded,
            format!("transaction retry limit exceeded after {} retries", retries),
        )
    }

    /// Debug operation without privilege.
    pub fn insufficient_privilege(operation: &str) -> Self {
        Self::new(
            TxnErrorKind::InsufficientPrivilege,
            format!("insufficient privilege to call {}", operation),
        )
    }

    /// Malformed debug function argument.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(TxnErrorKind::SyntaxError, message)
    }

    /// Error armed through the debug gateway.
    pub fn injected(tag: Option<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new(TxnErrorKind::Injected, message);
        err.tag = tag;
        err
    }

    /// Non-retryable failure from the KV layer.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(TxnErrorKind::StorageFailure, message)
    }

    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// SQLSTATE for this error. Injected errors report their tag when one was given.
    pub fn sqlstate(&self) -> &str {
        match (&self.kind, &self.tag) {
            (TxnErrorKind::Injected, Some(tag)) => tag,
            _ => self.kind.sqlstate(),
        }
    }

    /// Whether the transaction body may be re-executed under a new epoch.
    pub fn is_retryable(&self) -> bool {
        self.kind == TxnErrorKind::RetryableConflict
    }
}

/// Result type for transaction operations
pub type TxnResult<T> = Result<T, TxnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(TxnError::retryable("lost", None).is_retryable());
        assert!(!TxnError::retry_limit_exceeded(3).is_retryable());
        assert!(!TxnError::already_open().is_retryable());
        assert!(!TxnError::storage("disk").is_retryable());
    }

    #[test]
    fn test_display_carries_code() {
        let err = TxnError::unknown_priority("URGENT");
        let display = err.to_string();
        assert!(display.starts_with("AERO_TXN_UNKNOWN_PRIORITY"));
        assert!(display.contains("URGENT"));
    }

    #[test]
    fn test_injected_tag_overrides_sqlstate() {
        let tagged = TxnError::injected(Some("22012".to_string()), "boom");
        assert_eq!(tagged.sqlstate(), "22012");

        let untagged = TxnError::injected(None, "boom");
        assert_eq!(untagged.sqlstate(), "XX000");
    }

    #[test]
    fn test_sqlstates() {
        assert_eq!(TxnErrorKind::RetryableConflict.sqlstate(), "40001");
        assert_eq!(TxnErrorKind::InsufficientPrivilege.sqlstate(), "42501");
        assert_eq!(TxnErrorKind::SyntaxError.sqlstate(), "42601");
    }
}
