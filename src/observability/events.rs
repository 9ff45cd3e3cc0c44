//! Observable events of the transaction core
//!
//! Events are explicit and typed; the string form is what appears in the
//! `event` key of a log line.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Transaction lifecycle
    /// BEGIN created a record
    TxnBegin,
    /// Isolation or priority changed before the first data op
    TxnConfigured,
    /// Record entered CommitWait
    TxnCommitWait,
    /// KV layer confirmed the commit
    TxnCommit,
    /// ROLLBACK, disconnect or forced abort
    TxnRollback,
    /// Non-retryable failure aborted the record
    TxnAbort,
    /// Record lost a conflict
    TxnRetryableAbort,
    /// New epoch started
    TxnRetry,
    /// Retry budget exhausted (terminal)
    TxnRetryLimitExceeded,
    /// Result from a previous epoch discarded
    TxnStaleResult,
    /// ROLLBACK with nothing to roll back
    TxnNoTransaction,

    // Conflicts
    /// Winner and loser decided
    ConflictResolved,
    /// Autocommit statement restarted after a conflict
    ImplicitRetry,

    // Debug gateway
    /// Privileged debug operation executed
    DebugInjection,
    /// Debug operation refused
    PrivilegeDenied,
    /// Verbosity map replaced
    VerbositySet,
    /// Deliberate process-fatal injection
    ForcedPanic,

    // Shell
    /// Configuration loaded
    ConfigLoaded,
    /// Shell ready for statements
    ShellStart,
    /// Shell input ended
    ShellStop,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::TxnBegin => "TXN_BEGIN",
            Event::TxnConfigured => "TXN_CONFIGURED",
            Event::TxnCommitWait => "TXN_COMMIT_WAIT",
            Event::TxnCommit => "TXN_COMMIT",
            Event::TxnRollback => "TXN_ROLLBACK",
            Event::TxnAbort => "TXN_ABORT",
            Event::TxnRetryableAbort => "TXN_RETRYABLE_ABORT",
            Event::TxnRetry => "TXN_RETRY",
            Event::TxnRetryLimitExceeded => "TXN_RETRY_LIMIT_EXCEEDED",
            Event::TxnStaleResult => "TXN_STALE_RESULT",
            Event::TxnNoTransaction => "TXN_NO_TRANSACTION",
            Event::ConflictResolved => "CONFLICT_RESOLVED",
            Event::ImplicitRetry => "IMPLICIT_RETRY",
            Event::DebugInjection => "DEBUG_INJECTION",
            Event::PrivilegeDenied => "PRIVILEGE_DENIED",
            Event::VerbositySet => "VERBOSITY_SET",
            Event::ForcedPanic => "FORCED_PANIC",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ShellStart => "SHELL_START",
            Event::ShellStop => "SHELL_STOP",
        }
    }

    /// Only a forced panic ends the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ForcedPanic)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
