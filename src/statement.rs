//! Statement layer
//!
//! Transaction-control and data statements as they arrive from a client,
//! one JSON object each:
//!
//! ```json
//! {"op": "begin", "isolation": "snapshot", "priority": "high"}
//! {"op": "write", "key": "a", "value": "1"}
//! {"op": "commit"}
//! ```
//!
//! `execute` drives the session state machine. A read or write issued with no
//! transaction runs as an implicit transaction that commits on its own and is
//! retried automatically on conflict, within the session's retry budget.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::debug::DebugGateway;
use crate::observability::{Event, Logger};
use crate::session::Session;
use crate::txn::{
    IsolationLevel, IsolationType, SessionTxnState, TransactionRecord, TxnId, TxnResult,
    UserPriority,
};

/// One client statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Statement {
    /// BEGIN [ISOLATION LEVEL ..] [PRIORITY ..]
    Begin {
        #[serde(default)]
        isolation: Option<String>,
        #[serde(default)]
        priority: Option<String>,
    },
    /// SET TRANSACTION [ISOLATION LEVEL ..] [PRIORITY ..]
    SetTransaction {
        #[serde(default)]
        isolation: Option<String>,
        #[serde(default)]
        priority: Option<String>,
    },
    Commit,
    Rollback,
    /// Restart a transaction that lost a conflict
    Retry,
    Read {
        key: String,
    },
    Write {
        key: String,
        value: String,
    },
    ForceError {
        #[serde(default)]
        code: Option<String>,
        message: String,
    },
    ForceRetry {
        delay_ms: u64,
    },
    ForceAbort,
    ForcePanic {
        message: String,
    },
    SetDebugVerbosity {
        spec: String,
    },
    /// Current session state and record
    ShowTransaction,
}

impl Statement {
    pub fn name(&self) -> &'static str {
        match self {
            Statement::Begin { .. } => "begin",
            Statement::SetTransaction { .. } => "set_transaction",
            Statement::Commit => "commit",
            Statement::Rollback => "rollback",
            Statement::Retry => "retry",
            Statement::Read { .. } => "read",
            Statement::Write { .. } => "write",
            Statement::ForceError { .. } => "force_error",
            Statement::ForceRetry { .. } => "force_retry",
            Statement::ForceAbort => "force_abort",
            Statement::ForcePanic { .. } => "force_panic",
            Statement::SetDebugVerbosity { .. } => "set_debug_verbosity",
            Statement::ShowTransaction => "show_transaction",
        }
    }

    /// Whether the statement reads or writes data.
    pub fn is_data_op(&self) -> bool {
        matches!(self, Statement::Read { .. } | Statement::Write { .. })
    }
}

/// Client-facing view of a transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    pub id: TxnId,
    pub epoch: u32,
    pub isolation: IsolationType,
    pub priority: u32,
    pub status: &'static str,
    pub implicit: bool,
}

impl From<&TransactionRecord> for TransactionView {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            id: record.id(),
            epoch: record.epoch().value(),
            isolation: record.isolation(),
            priority: record.priority().value(),
            status: record.status().as_str(),
            implicit: record.is_implicit(),
        }
    }
}

/// Result of a successful statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementResult {
    /// Statement ran; nothing to report
    Ok,
    /// BEGIN or RETRY
    Transaction { txn: TransactionView },
    /// READ
    Value { value: Option<String> },
    /// COMMIT, or an implicit transaction's commit
    Committed { commit_ts: u64 },
    /// ROLLBACK
    RolledBack { txn_id: Option<TxnId> },
    /// Debug gateway return code
    Integer { value: i64 },
    /// SHOW TRANSACTION
    State {
        state: &'static str,
        txn: Option<TransactionView>,
    },
}

/// Execute one statement against `session`.
///
/// An error armed by `force_error` is returned instead of running the
/// statement. A record that ends the statement Committed or Aborted is
/// acknowledged before returning.
pub async fn execute(session: &mut Session, stmt: &Statement) -> TxnResult<StatementResult> {
    if let Some(err) = session.take_injected_error() {
        return Err(err);
    }
    let result = dispatch(session, stmt).await;
    session.acknowledge();
    result
}

async fn dispatch(session: &mut Session, stmt: &Statement) -> TxnResult<StatementResult> {
    match stmt {
        Statement::Begin {
            isolation,
            priority,
        } => {
            let isolation = IsolationLevel::from_optional(isolation.as_deref())?;
            let priority = UserPriority::from_optional(priority.as_deref())?;
            let record = session.begin_transaction(isolation, priority)?;
            Ok(StatementResult::Transaction { txn: record.into() })
        }
        Statement::SetTransaction {
            isolation,
            priority,
        } => {
            let isolation = IsolationLevel::from_optional(isolation.as_deref())?;
            let priority = UserPriority::from_optional(priority.as_deref())?;
            session.set_transaction(isolation, priority)?;
            Ok(StatementResult::Ok)
        }
        Statement::Commit => {
            let timestamp = session.commit_and_wait().await?;
            Ok(StatementResult::Committed {
                commit_ts: timestamp.value(),
            })
        }
        Statement::Rollback => {
            let released = session.rollback()?;
            Ok(StatementResult::RolledBack {
                txn_id: released.map(|r| r.id()),
            })
        }
        Statement::Retry => {
            let record = session.retry()?;
            Ok(StatementResult::Transaction { txn: record.into() })
        }
        Statement::Read { .. } | Statement::Write { .. } => {
            if session.state() == SessionTxnState::NoTxn {
                run_implicit(session, stmt).await
            } else {
                data_op(session, stmt)
            }
        }
        Statement::ForceError { code, message } => {
            let value = DebugGateway::force_error(session, code.clone(), message.clone())?;
            Ok(StatementResult::Integer { value })
        }
        Statement::ForceRetry { delay_ms } => {
            let value = DebugGateway::force_retry(session, Duration::from_millis(*delay_ms))?;
            Ok(StatementResult::Integer { value })
        }
        Statement::ForceAbort => {
            let value = DebugGateway::force_abort(session)?;
            Ok(StatementResult::Integer { value })
        }
        Statement::ForcePanic { message } => {
            let value = DebugGateway::force_panic(session, message)?;
            Ok(StatementResult::Integer { value })
        }
        Statement::SetDebugVerbosity { spec } => {
            let value = DebugGateway::set_debug_verbosity(session, spec)?;
            Ok(StatementResult::Integer { value })
        }
        Statement::ShowTransaction => Ok(StatementResult::State {
            state: session.state().state_name(),
            txn: session.record().map(TransactionView::from),
        }),
    }
}

fn data_op(session: &mut Session, stmt: &Statement) -> TxnResult<StatementResult> {
    match stmt {
        Statement::Read { key } => {
            let value = session.read(key.as_bytes())?;
            Ok(StatementResult::Value {
                value: value.map(|v| String::from_utf8_lossy(&v).into_owned()),
            })
        }
        Statement::Write { key, value } => {
            session.write(key.as_bytes(), value.as_bytes().to_vec())?;
            Ok(StatementResult::Ok)
        }
        other => Err(crate::txn::TxnError::invalid_state(format!(
            "{} is not a data statement",
            other.name()
        ))),
    }
}

/// Run a data statement in its own transaction, retrying conflicts.
async fn run_implicit(session: &mut Session, stmt: &Statement) -> TxnResult<StatementResult> {
    session.begin_implicit()?;
    loop {
        let attempt = match data_op(session, stmt) {
            Ok(result) => session.commit_and_wait().await.map(|_| result),
            Err(err) => Err(err),
        };

        match attempt {
            Ok(result) => return Ok(result),
            Err(err) if err.is_retryable() && session.state() == SessionTxnState::RetryableAbort => {
                let epoch = session
                    .record()
                    .map(|r| r.epoch().to_string())
                    .unwrap_or_default();
                Logger::info(
                    Event::ImplicitRetry.as_str(),
                    &[("statement", stmt.name()), ("epoch", &epoch)],
                );
                session.retry()?;
            }
            Err(err) => {
                if session.state().is_in_progress() {
                    session.rollback()?;
                }
                return Err(err);
            }
        }
    }
}
