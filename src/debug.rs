//! Debug Injection Gateway
//!
//! Privileged operations that perturb a session for testing:
//! - `force_error`: arm an error for the session's next statement
//! - `force_retry`: push a young transaction into RetryableAbort
//! - `force_abort`: abort the current transaction
//! - `force_panic`: crash the process
//! - `set_debug_verbosity`: replace the session's verbosity map
//!
//! Every operation checks the session's capability first. Only the highest
//! privilege passes; anyone else gets `InsufficientPrivilege` and the session
//! is left exactly as it was. Every attempt is audited.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::observability::{AuditAction, AuditOutcome, AuditRecord, Event, Logger};
use crate::session::Session;
use crate::txn::{TxnError, TxnId, TxnResult, TxnStatus};

/// Per-module verbosity levels, parsed from `name=integer[,name=integer]*`.
///
/// Names are not checked against known modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VerbosityMap {
    levels: BTreeMap<String, i32>,
}

fn entry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z0-9_./-]+)\s*=\s*(-?\d+)\s*$").unwrap_or_else(|e| {
            panic!("verbosity pattern does not compile: {}", e)
        })
    })
}

fn sqlstate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9A-Z]{5}$")
            .unwrap_or_else(|e| panic!("sqlstate pattern does not compile: {}", e))
    })
}

/// Check an injected error-code tag. An empty tag means no tag.
pub fn parse_error_code(code: Option<String>) -> TxnResult<Option<String>> {
    match code {
        None => Ok(None),
        Some(code) if code.is_empty() => Ok(None),
        Some(code) if sqlstate_pattern().is_match(&code) => Ok(Some(code)),
        Some(code) => Err(TxnError::syntax(format!(
            "invalid error code {:?}: expected a 5-character SQLSTATE of digits and upper-case letters",
            code
        ))),
    }
}

impl VerbosityMap {
    /// Parse a verbosity spec. The empty string yields an empty map.
    pub fn parse(spec: &str) -> TxnResult<Self> {
        let mut levels = BTreeMap::new();
        if spec.trim().is_empty() {
            return Ok(Self { levels });
        }

        for item in spec.split(',') {
            let malformed = || {
                TxnError::syntax(format!(
                    "invalid verbosity spec {:?}: expected comma-separated list of name=integer",
                    spec
                ))
            };
            let caps = entry_pattern().captures(item).ok_or_else(malformed)?;
            let level: i32 = caps[2].parse().map_err(|_| malformed())?;
            levels.insert(caps[1].to_string(), level);
        }
        Ok(Self { levels })
    }

    /// Level of `name`, 0 when unset.
    pub fn level(&self, name: &str) -> i32 {
        self.levels.get(name).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }
}

impl fmt::Display for VerbosityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, level) in &self.levels {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}={}", name, level)?;
            first = false;
        }
        Ok(())
    }
}

/// Privileged debug operations over a session.
pub struct DebugGateway;

impl DebugGateway {
    /// Refuse and audit the attempt unless the caller may inject.
    fn authorize(session: &Session, action: AuditAction) -> TxnResult<()> {
        let ctx = session.context();
        if ctx.can_inject() {
            return Ok(());
        }

        let err = TxnError::insufficient_privilege(action.as_str());
        session.metrics().increment_privilege_denials();
        session.audit(
            Self::record(session, action, AuditOutcome::Rejected).with_error(err.message.clone()),
        );
        Logger::warn(
            Event::PrivilegeDenied.as_str(),
            &[
                ("operation", action.as_str()),
                ("privilege", ctx.privilege.as_str()),
                ("session_id", &ctx.session_id.to_string()),
            ],
        );
        Err(err)
    }

    fn record(session: &Session, action: AuditAction, outcome: AuditOutcome) -> AuditRecord {
        let ctx = session.context();
        AuditRecord::new(action, outcome, ctx.session_id, ctx.privilege.as_str())
            .with_txn(session.record().map(|r| r.id()))
    }

    fn executed(session: &Session, action: AuditAction, txn: Option<TxnId>) {
        session.metrics().increment_debug_injections();
        session.audit(Self::record(session, action, AuditOutcome::Success));
        let txn = txn.map(|id| id.to_string()).unwrap_or_default();
        Logger::info(
            Event::DebugInjection.as_str(),
            &[("operation", action.as_str()), ("txn_id", &txn)],
        );
    }

    /// Arm an error for the session's next statement. Returns 0.
    ///
    /// `code` becomes the error's SQLSTATE tag when given. An empty code is
    /// no code; anything but a 5-character SQLSTATE fails with `SyntaxError`
    /// and arms nothing.
    pub fn force_error(
        session: &mut Session,
        code: Option<String>,
        message: impl Into<String>,
    ) -> TxnResult<i64> {
        Self::authorize(session, AuditAction::ForceError)?;

        let code = match parse_error_code(code) {
            Ok(code) => code,
            Err(err) => {
                session.audit(
                    Self::record(session, AuditAction::ForceError, AuditOutcome::Failed)
                        .with_error(err.message.clone()),
                );
                return Err(err);
            }
        };
        session.arm_injected_error(TxnError::injected(code, message));
        Self::executed(session, AuditAction::ForceError, session.record().map(|r| r.id()));
        Ok(0)
    }

    /// Force a young open transaction into RetryableAbort.
    ///
    /// If a transaction is Open and has run for less than `delay`, it is
    /// aborted as if it lost a conflict and `RetryableConflict` is returned.
    /// Otherwise nothing happens and 0 is returned.
    pub fn force_retry(session: &mut Session, delay: Duration) -> TxnResult<i64> {
        Self::authorize(session, AuditAction::ForceRetry)?;

        let young = session
            .record()
            .filter(|r| r.status() == TxnStatus::Open && r.elapsed() < delay)
            .map(|r| r.id());
        Self::executed(session, AuditAction::ForceRetry, young);

        match young {
            Some(_) => match session.force_retryable_abort("forced retry") {
                Some(err) => Err(err),
                None => Ok(0),
            },
            None => Ok(0),
        }
    }

    /// Abort the current transaction. Returns 0.
    pub fn force_abort(session: &mut Session) -> TxnResult<i64> {
        Self::authorize(session, AuditAction::ForceAbort)?;
        let txn = session.record().map(|r| r.id());
        session.abort_current(Event::TxnAbort, "forced abort");
        Self::executed(session, AuditAction::ForceAbort, txn);
        Ok(0)
    }

    /// Crash the process with `message`.
    pub fn force_panic(session: &mut Session, message: &str) -> TxnResult<i64> {
        Self::authorize(session, AuditAction::ForcePanic)?;
        Self::executed(session, AuditAction::ForcePanic, session.record().map(|r| r.id()));
        Logger::fatal(Event::ForcedPanic.as_str(), &[("message", message)]);
        panic!("{}", message);
    }

    /// Replace the session's verbosity map. Returns 0.
    ///
    /// A malformed spec fails with `SyntaxError` and keeps the old map.
    pub fn set_debug_verbosity(session: &mut Session, spec: &str) -> TxnResult<i64> {
        Self::authorize(session, AuditAction::SetDebugVerbosity)?;

        let verbosity = match VerbosityMap::parse(spec) {
            Ok(v) => v,
            Err(err) => {
                session.audit(
                    Self::record(session, AuditAction::SetDebugVerbosity, AuditOutcome::Failed)
                        .with_error(err.message.clone()),
                );
                return Err(err);
            }
        };

        let rendered = verbosity.to_string();
        session.set_verbosity(verbosity);
        Self::executed(session, AuditAction::SetDebugVerbosity, None);
        Logger::info(Event::VerbositySet.as_str(), &[("verbosity", &rendered)]);
        Ok(0)
    }
}
