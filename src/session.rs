//! Session Transaction State Machine
//!
//! A `Session` owns at most one `TransactionRecord` and is the only writer of
//! it. Every operation is a synchronous state transition; the one wait in the
//! lifecycle, the KV layer's commit confirmation, is handed back to the caller
//! as a `CommitPending` and fed in again through `complete_commit`.
//!
//! Ordering rules:
//! - BEGIN only from NoTxn (a finished record is acknowledged first)
//! - SET TRANSACTION only while Open and before the first read or write of
//!   the epoch; `Unspecified` fields are no-ops
//! - RETRY only from RetryableAbort, within the retry budget
//! - ROLLBACK and disconnect are honored in every state
//!
//! Committed and Aborted records stay attached until acknowledged, either
//! explicitly or by the next BEGIN.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use crate::cli::CliResult;
use crate::config::TxnConfig;
use crate::conflict::RetryPolicy;
use crate::debug::VerbosityMap;
use crate::kv::{CommitOutcome, CommitSignal, KvStore};
use crate::observability::{AuditLog, AuditRecord, Event, Logger, MemoryAuditLog, TxnMetrics};
use crate::txn::{
    escalate, Epoch, IsolationLevel, IsolationType, SessionTxnState, Timestamp, TransactionRecord,
    TxnError, TxnErrorKind, TxnId, TxnMeta, TxnResult, TxnStatus, UserPriority,
};

/// Verbosity module name gating the session's TRACE logs.
pub const TRACE_MODULE: &str = "txn";

/// Caller role attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Privilege {
    /// Ordinary SQL user
    User,
    /// Administrative user
    Admin,
    /// Highest trust level; required for debug injection
    Root,
}

impl Privilege {
    /// Whether this is the highest privilege level.
    pub fn is_highest(&self) -> bool {
        matches!(self, Privilege::Root)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::User => "USER",
            Privilege::Admin => "ADMIN",
            Privilege::Root => "ROOT",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity and capability of the caller owning a session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub privilege: Privilege,
    pub user: Option<String>,
}

impl SessionContext {
    pub fn new(privilege: Privilege) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            privilege,
            user: None,
        }
    }

    /// Create an ordinary user context.
    pub fn user() -> Self {
        Self::new(Privilege::User)
    }

    /// Create a root context.
    pub fn root() -> Self {
        Self::new(Privilege::Root)
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Check if debug injection is allowed.
    pub fn can_inject(&self) -> bool {
        self.privilege.is_highest()
    }
}

/// A commit waiting for the KV layer's answer.
#[derive(Debug)]
pub struct CommitPending {
    meta: TxnMeta,
    signal: CommitSignal,
}

impl CommitPending {
    /// Transaction and epoch the commit was issued for.
    pub fn meta(&self) -> TxnMeta {
        self.meta
    }

    /// Non-blocking poll of the outcome.
    pub fn try_outcome(&mut self) -> Option<CommitOutcome> {
        self.signal.try_outcome()
    }

    /// Wait for the outcome.
    pub async fn outcome(self) -> (TxnMeta, CommitOutcome) {
        let meta = self.meta;
        (meta, self.signal.outcome().await)
    }
}

fn no_transaction() -> TxnError {
    TxnError::invalid_state("there is no transaction in progress")
}

/// One client session.
pub struct Session {
    ctx: SessionContext,
    kv: Arc<dyn KvStore>,
    config: TxnConfig,
    retry_policy: RetryPolicy,
    default_isolation: IsolationType,
    record: Option<TransactionRecord>,
    /// Error armed by the debug gateway for the next statement
    injected: Option<TxnError>,
    verbosity: VerbosityMap,
    metrics: Arc<TxnMetrics>,
    audit: Arc<dyn AuditLog>,
    rng: StdRng,
}

impl Session {
    /// Open a session over an already validated configuration.
    ///
    /// `config` must have passed `TxnConfig::validate` (as every config from
    /// `TxnConfig::load` or `TxnConfig::from_json` has). Use `try_new` for a
    /// configuration assembled in code.
    pub fn new(ctx: SessionContext, kv: Arc<dyn KvStore>, config: TxnConfig) -> Self {
        Self {
            ctx,
            kv,
            retry_policy: config.retry_policy(),
            default_isolation: config.isolation().unwrap_or_default(),
            verbosity: config.verbosity(),
            config,
            record: None,
            injected: None,
            metrics: Arc::new(TxnMetrics::new()),
            audit: Arc::new(MemoryAuditLog::new()),
            rng: StdRng::from_entropy(),
        }
    }

    /// Validate `config`, then open a session over it.
    pub fn try_new(
        ctx: SessionContext,
        kv: Arc<dyn KvStore>,
        config: TxnConfig,
    ) -> CliResult<Self> {
        config.validate()?;
        Ok(Self::new(ctx, kv, config))
    }

    /// Share a metrics registry with other sessions.
    pub fn with_metrics(mut self, metrics: Arc<TxnMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Send debug-gateway audit records to `audit`.
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// Seed the escalation RNG.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn config(&self) -> &TxnConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<TxnMetrics> {
        &self.metrics
    }

    pub fn verbosity(&self) -> &VerbosityMap {
        &self.verbosity
    }

    /// The attached record, if any.
    pub fn record(&self) -> Option<&TransactionRecord> {
        self.record.as_ref()
    }

    pub fn state(&self) -> SessionTxnState {
        SessionTxnState::of(self.record.as_ref())
    }

    fn trace(&self, event: Event, fields: &[(&str, &str)]) {
        if self.verbosity.level(TRACE_MODULE) >= 1 {
            Logger::trace(event.as_str(), fields);
        }
    }

    /// Detach a Committed or Aborted record. Returns it if one was detached.
    pub fn acknowledge(&mut self) -> Option<TransactionRecord> {
        if self.state().is_terminal() {
            self.record.take()
        } else {
            None
        }
    }

    fn start_record(&mut self, implicit: bool) -> TxnResult<&TransactionRecord> {
        let id = TxnId::new();
        let timestamp = self.kv.begin(id, Epoch::ZERO)?;
        let mut record = if implicit {
            TransactionRecord::implicit(id, timestamp)
        } else {
            TransactionRecord::new(id, timestamp)
        };
        record.set_isolation(self.default_isolation)?;

        self.metrics.increment_begins();
        if implicit {
            self.metrics.increment_implicit_txns();
        }
        let record = self.record.insert(record);
        Ok(&*record)
    }

    /// BEGIN [ISOLATION LEVEL ..] [PRIORITY ..]
    pub fn begin_transaction(
        &mut self,
        isolation: IsolationLevel,
        priority: UserPriority,
    ) -> TxnResult<&TransactionRecord> {
        self.acknowledge();
        match self.state() {
            SessionTxnState::NoTxn => {}
            SessionTxnState::RetryableAbort => {
                return Err(TxnError::invalid_state(
                    "current transaction is awaiting retry; RETRY or ROLLBACK first",
                ))
            }
            _ => return Err(TxnError::already_open()),
        }

        self.start_record(false)?;
        if let Err(err) = self
            .set_isolation_level(isolation)
            .and_then(|_| self.set_user_priority(priority))
        {
            self.discard_current();
            return Err(err);
        }

        let record = self.record.as_ref().ok_or_else(no_transaction)?;
        let id = record.id().to_string();
        let priority = record.priority().to_string();
        Logger::info(
            Event::TxnBegin.as_str(),
            &[
                ("txn_id", &id),
                ("isolation", record.isolation().as_str()),
                ("priority", &priority),
                ("session_id", &self.ctx.session_id.to_string()),
            ],
        );
        Ok(record)
    }

    /// Attach an implicit record for a single autocommit statement.
    pub fn begin_implicit(&mut self) -> TxnResult<&TransactionRecord> {
        self.acknowledge();
        if self.state() != SessionTxnState::NoTxn {
            return Err(TxnError::invalid_state(format!(
                "cannot start an implicit transaction in state {}",
                self.state()
            )));
        }
        let record = self.start_record(true)?;
        let id = record.id().to_string();
        self.trace(Event::TxnBegin, &[("txn_id", &id), ("implicit", "true")]);
        self.record.as_ref().ok_or_else(no_transaction)
    }

    /// SET TRANSACTION [ISOLATION LEVEL ..] [PRIORITY ..]
    pub fn set_transaction(
        &mut self,
        isolation: IsolationLevel,
        priority: UserPriority,
    ) -> TxnResult<()> {
        match self.state() {
            SessionTxnState::Open => {}
            SessionTxnState::NoTxn | SessionTxnState::Committed | SessionTxnState::Aborted => {
                return Err(no_transaction())
            }
            other => {
                return Err(TxnError::invalid_state(format!(
                    "cannot SET TRANSACTION in state {}",
                    other
                )))
            }
        }
        self.set_isolation_level(isolation)?;
        self.set_user_priority(priority)
    }

    /// Apply an isolation request. `Unspecified` keeps the current value.
    pub fn set_isolation_level(&mut self, level: IsolationLevel) -> TxnResult<()> {
        let Some(isolation) = level.to_isolation_type() else {
            return Ok(());
        };
        let record = self.record.as_mut().ok_or_else(no_transaction)?;
        record.set_isolation(isolation)?;
        let id = record.id().to_string();
        self.trace(
            Event::TxnConfigured,
            &[("txn_id", &id), ("isolation", isolation.as_str())],
        );
        Ok(())
    }

    /// Apply a priority request. `Unspecified` keeps the current value.
    pub fn set_user_priority(&mut self, priority: UserPriority) -> TxnResult<()> {
        let Some(value) = priority.to_priority() else {
            return Ok(());
        };
        let record = self.record.as_mut().ok_or_else(no_transaction)?;
        record.set_priority(value)?;
        let id = record.id().to_string();
        let value = value.to_string();
        self.trace(Event::TxnConfigured, &[("txn_id", &id), ("priority", &value)]);
        Ok(())
    }

    fn require_open(&mut self) -> TxnResult<&mut TransactionRecord> {
        let record = self.record.as_mut().ok_or_else(no_transaction)?;
        match record.status() {
            TxnStatus::Open => Ok(record),
            TxnStatus::RetryableAbort => Err(TxnError::invalid_state(
                "current transaction is aborted pending retry; RETRY or ROLLBACK",
            )),
            TxnStatus::CommitWait => Err(TxnError::invalid_state(
                "current transaction is committing",
            )),
            TxnStatus::Committed | TxnStatus::Aborted => Err(no_transaction()),
        }
    }

    /// Reject results that belong to another transaction or epoch.
    fn check_current(&self, id: TxnId, epoch: Epoch) -> TxnResult<()> {
        match &self.record {
            Some(record) if record.id() == id && record.epoch() == epoch => Ok(()),
            _ => {
                let id = id.to_string();
                let epoch = epoch.to_string();
                Logger::warn(
                    Event::TxnStaleResult.as_str(),
                    &[("txn_id", &id), ("epoch", &epoch)],
                );
                Err(TxnError::invalid_state(format!(
                    "discarding stale result of transaction {} epoch {}",
                    id, epoch
                )))
            }
        }
    }

    /// Read `key` inside the open transaction.
    pub fn read(&mut self, key: &[u8]) -> TxnResult<Option<Vec<u8>>> {
        let record = self.require_open()?;
        record.mark_data_op()?;
        let meta = record.meta();

        match self.kv.read(&meta, key) {
            Ok(result) => {
                self.check_current(result.id, result.epoch)?;
                Ok(result.value)
            }
            Err(err) => Err(self.fail_with(err.into())),
        }
    }

    /// Write `key` inside the open transaction.
    pub fn write(&mut self, key: &[u8], value: Vec<u8>) -> TxnResult<()> {
        let record = self.require_open()?;
        record.mark_data_op()?;
        let meta = record.meta();

        self.kv
            .write(&meta, key, value)
            .map_err(|err| self.fail_with(err.into()))
    }

    /// Apply the state effect of a failed operation and hand the error back.
    ///
    /// Retryable conflicts move the record to RetryableAbort; storage failures
    /// abort it. Other kinds leave the record alone.
    fn fail_with(&mut self, err: TxnError) -> TxnError {
        match err.kind {
            TxnErrorKind::RetryableConflict => self.mark_retryable(&err),
            TxnErrorKind::StorageFailure => self.abort_current(Event::TxnAbort, &err.message),
            _ => {}
        }
        err
    }

    fn mark_retryable(&mut self, err: &TxnError) {
        let Some(record) = self.record.as_mut() else {
            return;
        };
        if record.transition(TxnStatus::RetryableAbort).is_err() {
            return;
        }
        self.metrics.increment_retryable_aborts();
        let id = record.id().to_string();
        let epoch = record.epoch().to_string();
        let winner = err
            .winner
            .map(|w| w.to_string())
            .unwrap_or_else(|| "none".to_string());
        Logger::info(
            Event::TxnRetryableAbort.as_str(),
            &[("txn_id", &id), ("epoch", &epoch), ("winner", &winner)],
        );
    }

    /// Abort the attached record if it is not finished. The record stays
    /// attached, Aborted, until acknowledged.
    pub(crate) fn abort_current(&mut self, event: Event, reason: &str) {
        let Some(record) = self.record.as_mut() else {
            return;
        };
        if record.status().is_terminal() {
            return;
        }
        self.kv.abort(&record.meta());
        if record.abort().is_err() {
            return;
        }
        self.metrics.increment_aborts();
        let id = record.id().to_string();
        Logger::info(event.as_str(), &[("txn_id", &id), ("reason", reason)]);
    }

    /// Drop a record that never did any work.
    fn discard_current(&mut self) {
        if let Some(record) = self.record.take() {
            self.kv.abort(&record.meta());
        }
    }

    /// Force the open record into RetryableAbort without contention.
    pub(crate) fn force_retryable_abort(&mut self, reason: &str) -> Option<TxnError> {
        match self.record.as_ref().map(|r| r.status()) {
            Some(TxnStatus::Open) => {
                let err = TxnError::retryable(reason.to_string(), None);
                Some(self.fail_with(err))
            }
            _ => None,
        }
    }

    pub(crate) fn arm_injected_error(&mut self, err: TxnError) {
        self.injected = Some(err);
    }

    /// Take the error armed by the debug gateway, if any.
    pub fn take_injected_error(&mut self) -> Option<TxnError> {
        self.injected.take()
    }

    /// Whether an injected error is waiting for the next statement.
    pub fn has_injected_error(&self) -> bool {
        self.injected.is_some()
    }

    pub(crate) fn set_verbosity(&mut self, verbosity: VerbosityMap) {
        self.verbosity = verbosity;
    }

    pub(crate) fn audit(&self, record: AuditRecord) {
        if let Err(e) = self.audit.append(&record) {
            Logger::error(
                Event::DebugInjection.as_str(),
                &[("audit_error", &e.to_string())],
            );
        }
    }

    /// COMMIT: Open → CommitWait, and hand back the pending confirmation.
    pub fn commit(&mut self) -> TxnResult<CommitPending> {
        let record = self.record.as_mut().ok_or_else(no_transaction)?;
        match record.status() {
            TxnStatus::Open => {}
            TxnStatus::RetryableAbort => {
                return Err(TxnError::invalid_state(
                    "current transaction is aborted pending retry; RETRY or ROLLBACK",
                ))
            }
            TxnStatus::CommitWait => {
                return Err(TxnError::invalid_state("commit already in progress"))
            }
            TxnStatus::Committed | TxnStatus::Aborted => return Err(no_transaction()),
        }
        record.transition(TxnStatus::CommitWait)?;
        let meta = record.meta();
        let signal = self.kv.commit(&meta);

        let id = meta.id.to_string();
        let epoch = meta.epoch.to_string();
        self.trace(Event::TxnCommitWait, &[("txn_id", &id), ("epoch", &epoch)]);
        Ok(CommitPending { meta, signal })
    }

    /// Feed the KV layer's commit outcome back into the state machine.
    ///
    /// Completions for a record that is gone, or for another epoch, are
    /// discarded with `InvalidTransactionState`.
    pub fn complete_commit(&mut self, meta: TxnMeta, outcome: CommitOutcome) -> TxnResult<Timestamp> {
        let waiting = self.record.as_ref().map_or(false, |r| {
            r.id() == meta.id && r.epoch() == meta.epoch && r.status() == TxnStatus::CommitWait
        });
        if !waiting {
            self.check_current(meta.id, meta.epoch)?;
            return Err(TxnError::invalid_state(
                "commit completion arrived for a transaction that is not committing",
            ));
        }

        match outcome {
            CommitOutcome::Committed { timestamp } => {
                let record = self.record.as_mut().ok_or_else(no_transaction)?;
                record.transition(TxnStatus::Committed)?;
                self.metrics.increment_commits();
                let id = meta.id.to_string();
                let epoch = meta.epoch.to_string();
                let ts = timestamp.to_string();
                Logger::info(
                    Event::TxnCommit.as_str(),
                    &[("txn_id", &id), ("epoch", &epoch), ("commit_ts", &ts)],
                );
                Ok(timestamp)
            }
            CommitOutcome::Failed(message) => Err(self.fail_with(TxnError::storage(message))),
            CommitOutcome::RetryableConflict { winner, message } => {
                Err(self.fail_with(TxnError::retryable(message, winner)))
            }
        }
    }

    /// COMMIT and wait for the KV layer's confirmation.
    pub async fn commit_and_wait(&mut self) -> TxnResult<Timestamp> {
        let pending = self.commit()?;
        let (meta, outcome) = pending.outcome().await;
        self.complete_commit(meta, outcome)
    }

    /// ROLLBACK: abort whatever is attached and detach it.
    ///
    /// Returns the released record. With nothing to roll back this logs a
    /// warning and succeeds.
    pub fn rollback(&mut self) -> TxnResult<Option<TransactionRecord>> {
        self.release(Event::TxnRollback, "rollback")
    }

    /// Session went away. Same as ROLLBACK, and drops any armed injection.
    pub fn disconnect(&mut self) -> Option<TransactionRecord> {
        self.injected = None;
        self.release(Event::TxnRollback, "disconnect").ok().flatten()
    }

    fn release(&mut self, event: Event, reason: &str) -> TxnResult<Option<TransactionRecord>> {
        let Some(mut record) = self.record.take() else {
            Logger::warn(Event::TxnNoTransaction.as_str(), &[("reason", reason)]);
            return Ok(None);
        };
        if record.status() == TxnStatus::Committed {
            Logger::warn(Event::TxnNoTransaction.as_str(), &[("reason", reason)]);
            return Ok(None);
        }
        if !record.status().is_terminal() {
            self.kv.abort(&record.meta());
            record.abort()?;
            self.metrics.increment_rollbacks();
        }
        let id = record.id().to_string();
        let epoch = record.epoch().to_string();
        Logger::info(
            event.as_str(),
            &[("txn_id", &id), ("epoch", &epoch), ("reason", reason)],
        );
        Ok(Some(record))
    }

    /// Restart a RetryableAbort record under the next epoch.
    ///
    /// The new epoch gets an escalated priority and a fresh timestamp. Past
    /// the retry budget the record is aborted and
    /// `TransactionRetryLimitExceeded` is returned.
    pub fn retry(&mut self) -> TxnResult<&TransactionRecord> {
        let record = self.record.as_ref().ok_or_else(no_transaction)?;
        if record.status() != TxnStatus::RetryableAbort {
            return Err(TxnError::invalid_state(format!(
                "cannot retry a transaction in state {}",
                record.status()
            )));
        }
        let (id, epoch, priority) = (record.id(), record.epoch(), record.priority());

        if let Err(err) = self.retry_policy.check(epoch) {
            self.metrics.increment_retry_limit_exceeded();
            self.abort_current(Event::TxnRetryLimitExceeded, &err.message);
            return Err(err);
        }

        let next = epoch
            .next()
            .ok_or_else(|| TxnError::invalid_state("epoch space exhausted"))?;
        let timestamp = match self.kv.begin(id, next) {
            Ok(ts) => ts,
            Err(err) => {
                let err: TxnError = err.into();
                if !err.is_retryable() {
                    self.abort_current(Event::TxnAbort, &err.message);
                }
                return Err(err);
            }
        };
        let escalated = escalate(priority, self.config.max_escalation_step, &mut self.rng);

        let record = self.record.as_mut().ok_or_else(no_transaction)?;
        record.begin_next_epoch(escalated, timestamp)?;
        self.metrics.increment_retries();

        let id = id.to_string();
        let epoch = next.to_string();
        let priority = escalated.to_string();
        Logger::info(
            Event::TxnRetry.as_str(),
            &[("txn_id", &id), ("epoch", &epoch), ("priority", &priority)],
        );
        Ok(&*record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use crate::txn::Priority;

    fn session() -> Session {
        Session::new(
            SessionContext::user(),
            Arc::new(MemoryKv::new()),
            TxnConfig::default(),
        )
        .with_rng_seed(1)
    }

    fn commit_now(session: &mut Session) -> TxnResult<Timestamp> {
        let mut pending = session.commit()?;
        let outcome = pending.try_outcome().expect("memory kv commits immediately");
        session.complete_commit(pending.meta(), outcome)
    }

    #[test]
    fn test_begin_defaults() {
        let mut s = session();
        let record = s
            .begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        assert_eq!(record.isolation(), IsolationType::Serializable);
        assert_eq!(record.priority(), Priority::normal());
        assert_eq!(record.epoch(), Epoch::ZERO);
        assert_eq!(s.state(), SessionTxnState::Open);
    }

    #[test]
    fn test_begin_twice_fails() {
        let mut s = session();
        s.begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        let err = s
            .begin_transaction(IsolationLevel::Snapshot, UserPriority::High)
            .unwrap_err();
        assert_eq!(err.kind, TxnErrorKind::TransactionAlreadyOpen);
        assert_eq!(s.record().unwrap().isolation(), IsolationType::Serializable);
    }

    #[test]
    fn test_set_without_transaction() {
        let mut s = session();
        let err = s
            .set_transaction(IsolationLevel::Snapshot, UserPriority::Unspecified)
            .unwrap_err();
        assert_eq!(err.kind, TxnErrorKind::InvalidTransactionState);
    }

    #[test]
    fn test_unspecified_set_after_data_op_is_noop() {
        let mut s = session();
        s.begin_transaction(IsolationLevel::Unspecified, UserPriority::High)
            .unwrap();
        s.read(b"k").unwrap();
        s.set_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        assert_eq!(s.record().unwrap().priority(), Priority::high());
    }

    #[test]
    fn test_commit_lifecycle() {
        let mut s = session();
        s.begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        s.write(b"k", b"v".to_vec()).unwrap();

        let mut pending = s.commit().unwrap();
        assert_eq!(s.state(), SessionTxnState::CommitWait);

        let outcome = pending.try_outcome().unwrap();
        s.complete_commit(pending.meta(), outcome).unwrap();
        assert_eq!(s.state(), SessionTxnState::Committed);

        assert!(s.acknowledge().is_some());
        assert_eq!(s.state(), SessionTxnState::NoTxn);
        assert_eq!(s.metrics().snapshot().commits, 1);
    }

    #[test]
    fn test_commit_without_transaction() {
        let mut s = session();
        assert_eq!(
            s.commit().unwrap_err().kind,
            TxnErrorKind::InvalidTransactionState
        );
    }

    #[test]
    fn test_rollback_without_transaction_is_noop() {
        let mut s = session();
        assert!(s.rollback().unwrap().is_none());
    }

    #[test]
    fn test_rollback_releases_record() {
        let mut s = session();
        s.begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        let released = s.rollback().unwrap().unwrap();
        assert_eq!(released.status(), TxnStatus::Aborted);
        assert_eq!(s.state(), SessionTxnState::NoTxn);
    }

    #[test]
    fn test_begin_acknowledges_finished_record() {
        let mut s = session();
        s.begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        commit_now(&mut s).unwrap();
        assert_eq!(s.state(), SessionTxnState::Committed);

        s.begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        assert_eq!(s.state(), SessionTxnState::Open);
    }

    #[test]
    fn test_retry_requires_retryable_abort() {
        let mut s = session();
        s.begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        assert_eq!(
            s.retry().unwrap_err().kind,
            TxnErrorKind::InvalidTransactionState
        );
    }

    #[test]
    fn test_forced_retryable_abort_and_retry() {
        let mut s = session();
        s.begin_transaction(IsolationLevel::Unspecified, UserPriority::Low)
            .unwrap();
        s.write(b"k", b"v".to_vec()).unwrap();
        let err = s.force_retryable_abort("forced").unwrap();
        assert!(err.is_retryable());
        assert_eq!(s.state(), SessionTxnState::RetryableAbort);

        let before = s.record().unwrap().priority();
        let record = s.retry().unwrap();
        assert_eq!(record.epoch(), Epoch::new(1));
        assert!(record.priority() > before);
        assert!(!record.data_op_started());
    }

    #[test]
    fn test_begin_while_awaiting_retry() {
        let mut s = session();
        s.begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        s.force_retryable_abort("forced");
        let err = s
            .begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap_err();
        assert_eq!(err.kind, TxnErrorKind::InvalidTransactionState);
    }

    #[test]
    fn test_stale_commit_completion_is_discarded() {
        let mut s = session();
        s.begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        let pending = s.commit().unwrap();
        let meta = pending.meta();
        s.rollback().unwrap();

        let err = s
            .complete_commit(
                meta,
                CommitOutcome::Committed {
                    timestamp: Timestamp::new(99),
                },
            )
            .unwrap_err();
        assert_eq!(err.kind, TxnErrorKind::InvalidTransactionState);
        assert_eq!(s.state(), SessionTxnState::NoTxn);
    }

    #[test]
    fn test_default_isolation_from_config() {
        let config = TxnConfig {
            default_isolation: "snapshot".to_string(),
            ..TxnConfig::default()
        };
        let mut s = Session::new(SessionContext::user(), Arc::new(MemoryKv::new()), config);
        let record = s
            .begin_transaction(IsolationLevel::Unspecified, UserPriority::Unspecified)
            .unwrap();
        assert_eq!(record.isolation(), IsolationType::Snapshot);
    }

    #[test]
    fn test_try_new_rejects_invalid_config() {
        let bad_isolation = TxnConfig {
            default_isolation: "read committed".to_string(),
            ..TxnConfig::default()
        };
        let err = Session::try_new(
            SessionContext::user(),
            Arc::new(MemoryKv::new()),
            bad_isolation,
        )
        .err()
        .unwrap();
        assert_eq!(err.code_str(), "AERO_CLI_CONFIG_ERROR");

        let bad_verbosity = TxnConfig {
            debug_verbosity: Some("txn".to_string()),
            ..TxnConfig::default()
        };
        assert!(Session::try_new(
            SessionContext::user(),
            Arc::new(MemoryKv::new()),
            bad_verbosity
        )
        .is_err());

        assert!(Session::try_new(
            SessionContext::user(),
            Arc::new(MemoryKv::new()),
            TxnConfig::default()
        )
        .is_ok());
    }

    #[test]
    fn test_privilege_ordering() {
        assert!(Privilege::User < Privilege::Admin);
        assert!(Privilege::Admin < Privilege::Root);
        assert!(Privilege::Root.is_highest());
        assert!(!Privilege::Admin.is_highest());
    }
}
