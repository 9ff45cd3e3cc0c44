//! Session Transaction State
//!
//! The session-level view of the transaction state machine. A session with
//! no record is in `NoTxn` (autocommit); otherwise the state mirrors the
//! record's status.
//!
//! ```text
//! NoTxn --BEGIN--> Open --COMMIT--> CommitWait --confirm--> Committed --ack--> NoTxn
//!                   |                   |
//!                   +--conflict--> RetryableAbort --retry--> Open (epoch + 1)
//!                   |                   |
//!                   +---ROLLBACK---> Aborted --ack--> NoTxn
//! ```

use std::fmt;

use super::record::{TransactionRecord, TxnStatus};

/// State of a session's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionTxnState {
    NoTxn,
    Open,
    CommitWait,
    Committed,
    Aborted,
    RetryableAbort,
}

impl SessionTxnState {
    /// Derive the session state from the record it holds, if any.
    pub fn of(record: Option<&TransactionRecord>) -> Self {
        match record.map(|r| r.status()) {
            None => Self::NoTxn,
            Some(TxnStatus::Open) => Self::Open,
            Some(TxnStatus::CommitWait) => Self::CommitWait,
            Some(TxnStatus::Committed) => Self::Committed,
            Some(TxnStatus::Aborted) => Self::Aborted,
            Some(TxnStatus::RetryableAbort) => Self::RetryableAbort,
        }
    }

    /// Get the state name for observability.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::NoTxn => "NoTxn",
            Self::Open => "Open",
            Self::CommitWait => "CommitWait",
            Self::Committed => "Committed",
            Self::Aborted => "Aborted",
            Self::RetryableAbort => "RetryableAbort",
        }
    }

    /// A record is attached and not yet finished.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Open | Self::CommitWait | Self::RetryableAbort)
    }

    /// The record reached an end state and awaits acknowledgment.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for SessionTxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::{Timestamp, TxnId};

    #[test]
    fn test_no_record_is_no_txn() {
        assert_eq!(SessionTxnState::of(None), SessionTxnState::NoTxn);
        assert!(!SessionTxnState::NoTxn.is_in_progress());
    }

    #[test]
    fn test_state_follows_record() {
        let mut record = TransactionRecord::new(TxnId::new(), Timestamp::new(1));
        assert_eq!(SessionTxnState::of(Some(&record)), SessionTxnState::Open);

        record.transition(TxnStatus::RetryableAbort).unwrap();
        let state = SessionTxnState::of(Some(&record));
        assert_eq!(state, SessionTxnState::RetryableAbort);
        assert!(state.is_in_progress());
        assert!(!state.is_terminal());

        record.abort().unwrap();
        assert!(SessionTxnState::of(Some(&record)).is_terminal());
    }
}
