//! Audit trail for privileged debug operations
//!
//! Every debug gateway attempt is recorded, whether it executed, was rejected
//! for lack of privilege, or failed validation. Records are append-only.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::txn::TxnId;

/// Debug operation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ForceError,
    ForceRetry,
    ForceAbort,
    ForcePanic,
    SetDebugVerbosity,
}

impl AuditAction {
    /// Name of the operation as exposed to SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ForceError => "force_error",
            AuditAction::ForceRetry => "force_retry",
            AuditAction::ForceAbort => "force_abort",
            AuditAction::ForcePanic => "force_panic",
            AuditAction::SetDebugVerbosity => "set_debug_verbosity",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    /// Operation ran
    Success,
    /// Caller lacked privilege; nothing changed
    Rejected,
    /// Operation ran but its arguments were invalid
    Failed,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub session_id: Uuid,
    pub privilege: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<TxnId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    pub fn new(
        action: AuditAction,
        outcome: AuditOutcome,
        session_id: Uuid,
        privilege: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            outcome,
            session_id,
            privilege: privilege.into(),
            txn_id: None,
            error: None,
        }
    }

    pub fn with_txn(mut self, id: Option<TxnId>) -> Self {
        self.txn_id = id;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Serialize to one JSON line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"id":"{}","error":"unserializable audit record: {}"}}"#, self.id, e)
        })
    }
}

/// Append-only audit sink.
pub trait AuditLog: Send + Sync {
    fn append(&self, record: &AuditRecord) -> io::Result<()>;
}

/// In-memory audit log.
///
/// Cloning shares the same record list.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        self.records
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audit log poisoned"))?
            .push(record.clone());
        Ok(())
    }
}
