//! Transaction Record
//!
//! One logical transaction: identity, epoch, isolation, priority, status and
//! the KV-assigned timestamp.
//!
//! Invariants enforced here:
//! - `id` never changes
//! - `epoch` strictly increases, and only out of `RetryableAbort`
//! - isolation and priority are write-once per epoch: frozen by the first
//!   data operation
//! - status only moves forward within an epoch

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{TxnError, TxnResult};
use super::isolation::IsolationType;
use super::priority::Priority;

/// Opaque transaction identity, assigned at BEGIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(Uuid);

impl TxnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Retry attempt counter for one transaction identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Epoch(u32);

impl Epoch {
    pub const ZERO: Epoch = Epoch(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    /// The following epoch, or `None` on overflow.
    pub fn next(&self) -> Option<Epoch> {
        self.0.checked_add(1).map(Epoch)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical timestamp assigned by the KV layer. Only ordering is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnStatus {
    Open,
    CommitWait,
    Committed,
    Aborted,
    RetryableAbort,
}

impl TxnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::CommitWait => "CommitWait",
            Self::Committed => "Committed",
            Self::Aborted => "Aborted",
            Self::RetryableAbort => "RetryableAbort",
        }
    }

    /// Committed and Aborted end the record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    /// Whether `self → to` is allowed within one epoch.
    ///
    /// RetryableAbort → Open is not listed: a new epoch is started through
    /// `TransactionRecord::begin_next_epoch`, never through a plain transition.
    pub fn can_transition_to(&self, to: TxnStatus) -> bool {
        use TxnStatus::*;
        matches!(
            (self, to),
            (Open, CommitWait)
                | (Open, Aborted)
                | (Open, RetryableAbort)
                | (CommitWait, Committed)
                | (CommitWait, Aborted)
                | (CommitWait, RetryableAbort)
                | (RetryableAbort, Aborted)
        )
    }
}

impl fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// KV-facing view of a record: what the storage layer and the conflict
/// resolver see. A copy, never an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnMeta {
    pub id: TxnId,
    pub epoch: Epoch,
    pub isolation: IsolationType,
    pub priority: Priority,
    pub timestamp: Timestamp,
}

/// The transaction record owned by a session.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    id: TxnId,
    epoch: Epoch,
    isolation: IsolationType,
    priority: Priority,
    status: TxnStatus,
    timestamp: Timestamp,
    /// A read or write has been issued in the current epoch
    data_op_started: bool,
    /// Created for a statement outside BEGIN/COMMIT
    implicit: bool,
    started_at: Instant,
}

impl TransactionRecord {
    /// Create an Open record at epoch 0 with default isolation and priority.
    pub fn new(id: TxnId, timestamp: Timestamp) -> Self {
        Self {
            id,
            epoch: Epoch::ZERO,
            isolation: IsolationType::default(),
            priority: Priority::default(),
            status: TxnStatus::Open,
            timestamp,
            data_op_started: false,
            implicit: false,
            started_at: Instant::now(),
        }
    }

    /// Create a record for an autocommit statement.
    pub fn implicit(id: TxnId, timestamp: Timestamp) -> Self {
        Self {
            implicit: true,
            ..Self::new(id, timestamp)
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn isolation(&self) -> IsolationType {
        self.isolation
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> TxnStatus {
        self.status
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn data_op_started(&self) -> bool {
        self.data_op_started
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    /// Time since the record was created, across epochs.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn meta(&self) -> TxnMeta {
        TxnMeta {
            id: self.id,
            epoch: self.epoch,
            isolation: self.isolation,
            priority: self.priority,
            timestamp: self.timestamp,
        }
    }

    fn check_configurable(&self, what: &str) -> TxnResult<()> {
        if self.status != TxnStatus::Open {
            return Err(TxnError::invalid_state(format!(
                "cannot set {} in transaction state {}",
                what, self.status
            )));
        }
        if self.data_op_started {
            return Err(TxnError::invalid_state(format!(
                "cannot set {} after the first read or write of epoch {}",
                what, self.epoch
            )));
        }
        Ok(())
    }

    /// Set isolation. Legal only while Open and before the first data op.
    pub fn set_isolation(&mut self, isolation: IsolationType) -> TxnResult<()> {
        self.check_configurable("isolation level")?;
        self.isolation = isolation;
        Ok(())
    }

    /// Set priority. Legal only while Open and before the first data op.
    pub fn set_priority(&mut self, priority: Priority) -> TxnResult<()> {
        self.check_configurable("transaction priority")?;
        self.priority = priority;
        Ok(())
    }

    /// Record that a data operation is being issued. Freezes isolation and
    /// priority for the rest of the epoch.
    pub fn mark_data_op(&mut self) -> TxnResult<()> {
        if self.status != TxnStatus::Open {
            return Err(TxnError::invalid_state(format!(
                "cannot read or write in transaction state {}",
                self.status
            )));
        }
        self.data_op_started = true;
        Ok(())
    }

    /// Move to `to` if the edge is allowed.
    pub fn transition(&mut self, to: TxnStatus) -> TxnResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(TxnError::invalid_state(format!(
                "forbidden transition: {} → {}",
                self.status, to
            )));
        }
        self.status = to;
        Ok(())
    }

    /// Abort from any non-terminal status. Idempotent on Aborted.
    pub fn abort(&mut self) -> TxnResult<()> {
        match self.status {
            TxnStatus::Aborted => Ok(()),
            _ => self.transition(TxnStatus::Aborted),
        }
    }

    /// RetryableAbort → Open under the next epoch.
    ///
    /// The escalated priority and the fresh KV timestamp are supplied by the
    /// caller; isolation carries over and is configurable again until the
    /// first data op of the new epoch.
    pub fn begin_next_epoch(&mut self, priority: Priority, timestamp: Timestamp) -> TxnResult<Epoch> {
        if self.status != TxnStatus::RetryableAbort {
            return Err(TxnError::invalid_state(format!(
                "cannot retry a transaction in state {}",
                self.status
            )));
        }
        let next = self
            .epoch
            .next()
            .ok_or_else(|| TxnError::invalid_state("epoch space exhausted"))?;
        self.epoch = next;
        self.priority = priority;
        self.timestamp = timestamp;
        self.data_op_started = false;
        self.status = TxnStatus::Open;
        Ok(next)
    }
}
