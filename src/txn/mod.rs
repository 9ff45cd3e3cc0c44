//! Transaction Domain Types
//!
//! This module provides:
//! - `IsolationLevel` / `IsolationType` - Isolation Policy
//! - `UserPriority` / `Priority` - Priority Policy and escalation
//! - `TransactionRecord` - one logical transaction and its epochs
//! - `SessionTxnState` - session-level state machine view
//! - `TxnError` - the error contract of the transaction core

mod errors;
mod isolation;
mod priority;
mod record;
mod state;

pub use errors::{TxnError, TxnErrorKind, TxnResult};
pub use isolation::{IsolationLevel, IsolationType};
pub use priority::{
    escalate, Priority, UserPriority, MAX_ESCALATION_STEP, MAX_USER_PRIORITY, MIN_USER_PRIORITY,
    NORMAL_USER_PRIORITY, PRIORITY_CEILING,
};
pub use record::{Epoch, Timestamp, TransactionRecord, TxnId, TxnMeta, TxnStatus};
pub use state::SessionTxnState;
