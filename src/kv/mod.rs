//! KV Layer Interface
//!
//! The distributed key-value substrate is an external collaborator. The
//! transaction core consumes it through `KvStore`:
//! - `begin` hands out the timestamp of a new epoch
//! - `read` / `write` carry the record's isolation and priority via `TxnMeta`
//! - `commit` returns a completion signal instead of blocking
//! - `abort` releases everything the transaction holds
//!
//! The KV layer owns contention detection. When it decides a transaction lost,
//! it reports `KvError::RetryableConflict` (or a `CommitOutcome` of the same
//! kind) to the losing side.
//!
//! `MemoryKv` is an in-memory implementation used by the shell and tests.

mod memory;

pub use memory::MemoryKv;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::txn::{Epoch, Timestamp, TxnError, TxnId, TxnMeta};

/// Errors reported by the KV layer for reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    /// The transaction lost a conflict and may be retried under a new epoch.
    #[error("retryable conflict: {message}")]
    RetryableConflict {
        winner: Option<TxnId>,
        message: String,
    },

    /// Failure that retrying will not fix.
    #[error("storage failure: {0}")]
    NonRetryable(String),
}

impl From<KvError> for TxnError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::RetryableConflict { winner, message } => TxnError::retryable(message, winner),
            KvError::NonRetryable(message) => TxnError::storage(message),
        }
    }
}

/// Result type for KV operations
pub type KvResult<T> = Result<T, KvError>;

/// A read result, tagged with the transaction epoch it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub id: TxnId,
    pub epoch: Epoch,
    pub value: Option<Vec<u8>>,
}

/// Final answer of the KV layer to a commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { timestamp: Timestamp },
    Failed(String),
    RetryableConflict {
        winner: Option<TxnId>,
        message: String,
    },
}

/// Future-style commit completion.
///
/// Awaiting it never happens inside the state machine; the session only
/// consumes the outcome once it is delivered.
#[derive(Debug)]
pub struct CommitSignal {
    rx: oneshot::Receiver<CommitOutcome>,
}

/// Sending half of a `CommitSignal`, held by the KV layer.
#[derive(Debug)]
pub struct CommitNotifier {
    tx: oneshot::Sender<CommitOutcome>,
}

impl CommitNotifier {
    /// Deliver the outcome. A dropped receiver (cancelled session) is ignored.
    pub fn notify(self, outcome: CommitOutcome) {
        let _ = self.tx.send(outcome);
    }
}

impl CommitSignal {
    /// Create a linked notifier / signal pair.
    pub fn pending() -> (CommitNotifier, CommitSignal) {
        let (tx, rx) = oneshot::channel();
        (CommitNotifier { tx }, CommitSignal { rx })
    }

    /// A signal that already carries its outcome.
    pub fn ready(outcome: CommitOutcome) -> Self {
        let (notifier, signal) = Self::pending();
        notifier.notify(outcome);
        signal
    }

    /// Non-blocking poll. `None` while the outcome is outstanding.
    ///
    /// A dropped notifier resolves to `CommitOutcome::Failed`.
    pub fn try_outcome(&mut self) -> Option<CommitOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(CommitOutcome::Failed("commit notifier dropped".to_string()))
            }
        }
    }

    /// Wait for the outcome.
    pub async fn outcome(self) -> CommitOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| CommitOutcome::Failed("commit notifier dropped".to_string()))
    }
}

/// Handle to the external KV layer.
pub trait KvStore: Send + Sync {
    /// Start epoch `epoch` of transaction `id` and return its timestamp.
    ///
    /// Starting a later epoch discards whatever the earlier epoch wrote.
    fn begin(&self, id: TxnId, epoch: Epoch) -> KvResult<Timestamp>;

    /// Read `key` on behalf of `meta`.
    fn read(&self, meta: &TxnMeta, key: &[u8]) -> KvResult<ReadResult>;

    /// Write `key` on behalf of `meta`.
    fn write(&self, meta: &TxnMeta, key: &[u8], value: Vec<u8>) -> KvResult<()>;

    /// Request commit of `meta`'s current epoch.
    fn commit(&self, meta: &TxnMeta) -> CommitSignal;

    /// Abort the transaction and release its writes.
    fn abort(&self, meta: &TxnMeta);
}
