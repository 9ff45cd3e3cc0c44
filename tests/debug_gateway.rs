//! Debug Gateway Tests
//!
//! Tests for privilege-gated debug injection:
//! - Non-root callers get InsufficientPrivilege and nothing changes
//! - Root callers get a zero return code
//! - Verbosity specs follow the name=integer grammar
//! - Every attempt is audited

use std::sync::Arc;
use std::time::Duration;

use aerotxn::config::TxnConfig;
use aerotxn::debug::DebugGateway;
use aerotxn::kv::MemoryKv;
use aerotxn::observability::{AuditAction, AuditOutcome, MemoryAuditLog};
use aerotxn::session::{Privilege, Session, SessionContext};
use aerotxn::statement::{self, Statement, StatementResult};
use aerotxn::txn::{IsolationLevel, SessionTxnState, TxnErrorKind, UserPriority};

// =============================================================================
// Helper Functions
// =============================================================================

fn session(privilege: Privilege) -> (Session, MemoryAuditLog) {
    let audit = MemoryAuditLog::new();
    let session = Session::new(
        SessionContext::new(privilege).with_user("tester"),
        Arc::new(MemoryKv::new()),
        TxnConfig::default(),
    )
    .with_audit(Arc::new(audit.clone()));
    (session, audit)
}

fn begin(session: &mut Session) {
    session
        .begin_transaction(IsolationLevel::Unspecified, UserPriority::High)
        .unwrap();
}

/// Everything a caller can observe about a session.
fn observe(session: &Session) -> (SessionTxnState, Option<(u32, u32)>, String, bool) {
    (
        session.state(),
        session
            .record()
            .map(|r| (r.epoch().value(), r.priority().value())),
        session.verbosity().to_string(),
        session.has_injected_error(),
    )
}

// =============================================================================
// Privilege Tests
// =============================================================================

/// Forced retry: refused for a user, zero for root.
#[test]
fn test_force_retry_privilege() {
    let (mut user, _) = session(Privilege::User);
    let err = DebugGateway::force_retry(&mut user, Duration::from_millis(10)).unwrap_err();
    assert_eq!(err.kind, TxnErrorKind::InsufficientPrivilege);
    assert_eq!(err.sqlstate(), "42501");

    let (mut root, _) = session(Privilege::Root);
    assert_eq!(
        DebugGateway::force_retry(&mut root, Duration::from_millis(10)).unwrap(),
        0
    );
}

/// No debug operation changes anything when refused.
#[test]
fn test_denied_operations_change_nothing() {
    for privilege in [Privilege::User, Privilege::Admin] {
        let (mut s, audit) = session(privilege);
        begin(&mut s);
        s.read(b"k").unwrap();
        let before = observe(&s);

        let results = [
            DebugGateway::force_error(&mut s, Some("XX001".into()), "x"),
            DebugGateway::force_retry(&mut s, Duration::from_secs(3600)),
            DebugGateway::force_abort(&mut s),
            DebugGateway::force_panic(&mut s, "must not panic"),
            DebugGateway::set_debug_verbosity(&mut s, "txn=5"),
        ];
        for result in results {
            assert_eq!(result.unwrap_err().kind, TxnErrorKind::InsufficientPrivilege);
        }

        assert_eq!(observe(&s), before);
        assert_eq!(audit.len(), 5);
        assert!(audit
            .records()
            .iter()
            .all(|r| r.outcome == AuditOutcome::Rejected && r.privilege == privilege.as_str()));
        assert_eq!(s.metrics().snapshot().privilege_denials, 5);
        assert_eq!(s.metrics().snapshot().debug_injections, 0);
    }
}

/// Root may force a young transaction into RetryableAbort and retry it.
#[test]
fn test_root_force_retry_then_retry() {
    let (mut s, audit) = session(Privilege::Root);
    begin(&mut s);

    let err = DebugGateway::force_retry(&mut s, Duration::from_secs(3600)).unwrap_err();
    assert_eq!(err.kind, TxnErrorKind::RetryableConflict);
    assert_eq!(err.winner, None);
    assert_eq!(s.state(), SessionTxnState::RetryableAbort);

    assert_eq!(s.retry().unwrap().epoch().value(), 1);

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, AuditAction::ForceRetry);
    assert_eq!(records[0].txn_id, s.record().map(|r| r.id()));
}

/// force_abort leaves the record Aborted; the next BEGIN starts clean.
#[test]
fn test_root_force_abort() {
    let (mut s, _) = session(Privilege::Root);
    begin(&mut s);
    assert_eq!(DebugGateway::force_abort(&mut s).unwrap(), 0);
    assert_eq!(s.state(), SessionTxnState::Aborted);

    begin(&mut s);
    assert_eq!(s.state(), SessionTxnState::Open);
}

/// force_panic from root takes the process down.
#[test]
#[should_panic(expected = "injected fatal")]
fn test_root_force_panic() {
    let (mut s, _) = session(Privilege::Root);
    let _ = DebugGateway::force_panic(&mut s, "injected fatal");
}

// =============================================================================
// Verbosity Tests
// =============================================================================

/// A spec missing `=` is a syntax error naming the expected format.
#[test]
fn test_malformed_verbosity() {
    let (mut s, _) = session(Privilege::Root);
    let err = DebugGateway::set_debug_verbosity(&mut s, "txn").unwrap_err();
    assert_eq!(err.kind, TxnErrorKind::SyntaxError);
    assert_eq!(err.sqlstate(), "42601");
    assert!(err.message.contains("name=integer"));
    assert!(s.verbosity().is_empty());
}

/// Well-formed specs succeed, unknown names included.
#[test]
fn test_well_formed_verbosity() {
    let (mut s, _) = session(Privilege::Root);
    assert_eq!(
        DebugGateway::set_debug_verbosity(&mut s, "txn=2,no_such_module=9").unwrap(),
        0
    );
    assert_eq!(s.verbosity().level("txn"), 2);
    assert_eq!(s.verbosity().level("no_such_module"), 9);
}

// =============================================================================
// Statement Layer Tests
// =============================================================================

/// An injected error is returned by the next statement, once.
#[tokio::test]
async fn test_injected_error_through_statements() {
    let (mut s, _) = session(Privilege::Root);
    let armed = statement::execute(
        &mut s,
        &Statement::ForceError {
            code: Some("XXA00".into()),
            message: "injected".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(armed, StatementResult::Integer { value: 0 });

    let err = statement::execute(&mut s, &Statement::ShowTransaction)
        .await
        .unwrap_err();
    assert_eq!(err.kind, TxnErrorKind::Injected);
    assert_eq!(err.sqlstate(), "XXA00");

    assert!(statement::execute(&mut s, &Statement::ShowTransaction)
        .await
        .is_ok());
}
