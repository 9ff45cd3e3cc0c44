//! Shell Scenario Tests
//!
//! End-to-end scenarios driven through the JSON-lines shell:
//! 1. BEGIN with no overrides
//! 2. BEGIN SNAPSHOT HIGH, SET before and after the first read
//! 3. Low and High sessions writing the same key
//! 4. Forced retry with and without privilege
//! 5. Verbosity spec grammar

use std::io::Cursor;
use std::sync::Arc;

use aerotxn::cli::{open_session, serve};
use aerotxn::config::TxnConfig;
use aerotxn::kv::MemoryKv;
use aerotxn::session::{Session, SessionContext};
use aerotxn::txn::{MAX_USER_PRIORITY, MIN_USER_PRIORITY, NORMAL_USER_PRIORITY};
use serde_json::Value;

// =============================================================================
// Helper Functions
// =============================================================================

async fn run(session: &mut Session, input: &str) -> Vec<Value> {
    let mut out = Vec::new();
    serve(session, Cursor::new(input.to_string()), &mut out)
        .await
        .unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// =============================================================================
// Scenarios
// =============================================================================

/// Scenario 1: defaults are Serializable at Normal priority.
#[tokio::test]
async fn test_begin_defaults() {
    let mut s = open_session(TxnConfig::default(), false).unwrap();
    let out = run(&mut s, r#"{"op":"begin"}"#).await;

    let txn = &out[0]["data"]["txn"];
    assert_eq!(txn["isolation"], "serializable");
    assert_eq!(txn["priority"], NORMAL_USER_PRIORITY);
    assert_eq!(txn["epoch"], 0);
    assert_eq!(txn["status"], "Open");
}

/// Scenario 2: SET PRIORITY LOW before the first read; SET NORMAL after fails.
#[tokio::test]
async fn test_set_before_and_after_read() {
    let mut s = open_session(TxnConfig::default(), false).unwrap();
    let out = run(
        &mut s,
        r#"{"op":"begin","isolation":"SNAPSHOT","priority":"HIGH"}
{"op":"set_transaction","priority":"LOW"}
{"op":"show_transaction"}
{"op":"read","key":"a"}
{"op":"set_transaction","priority":"NORMAL"}
{"op":"show_transaction"}
"#,
    )
    .await;

    assert_eq!(out[0]["data"]["txn"]["isolation"], "snapshot");
    assert_eq!(out[0]["data"]["txn"]["priority"], MAX_USER_PRIORITY);
    assert_eq!(out[1]["status"], "ok");
    assert_eq!(out[2]["data"]["txn"]["priority"], MIN_USER_PRIORITY);
    assert_eq!(out[3]["data"]["value"], Value::Null);
    assert_eq!(out[4]["code"], "AERO_TXN_INVALID_STATE");
    assert_eq!(out[5]["data"]["txn"]["priority"], MIN_USER_PRIORITY);
}

/// Scenario 3: the Low session loses, then RETRY bumps epoch and priority.
#[tokio::test]
async fn test_low_loses_to_high() {
    let kv = MemoryKv::new();
    let mut low = Session::new(
        SessionContext::user(),
        Arc::new(kv.clone()),
        TxnConfig::default(),
    );
    let mut high = Session::new(
        SessionContext::user(),
        Arc::new(kv.clone()),
        TxnConfig::default(),
    );

    run(&mut low, r#"{"op":"begin","priority":"low"}"#).await;
    run(
        &mut high,
        r#"{"op":"begin","priority":"high"}
{"op":"write","key":"k","value":"high"}"#,
    )
    .await;

    let out = run(
        &mut low,
        r#"{"op":"write","key":"k","value":"low"}
{"op":"show_transaction"}
{"op":"retry"}"#,
    )
    .await;

    assert_eq!(out[0]["sqlstate"], "40001");
    assert_eq!(out[0]["retryable"], true);
    assert_eq!(out[0]["winner"], high.record().unwrap().id().to_string());
    assert_eq!(out[1]["data"]["state"], "RetryableAbort");
    assert_eq!(out[2]["data"]["txn"]["epoch"], 1);
    assert!(out[2]["data"]["txn"]["priority"].as_u64().unwrap() > MIN_USER_PRIORITY as u64);
}

/// Scenario 4: forced retry is refused for a user and returns 0 for root.
#[tokio::test]
async fn test_force_retry_privilege() {
    let stmt = r#"{"op":"force_retry","delay_ms":10}"#;

    let mut user = open_session(TxnConfig::default(), false).unwrap();
    let out = run(&mut user, stmt).await;
    assert_eq!(out[0]["code"], "AERO_TXN_INSUFFICIENT_PRIVILEGE");

    let mut root = open_session(TxnConfig::default(), true).unwrap();
    let out = run(&mut root, stmt).await;
    assert_eq!(out[0]["status"], "ok");
    assert_eq!(out[0]["data"]["value"], 0);
}

/// Scenario 5: verbosity without `=` is a syntax error; unknown names are fine.
#[tokio::test]
async fn test_verbosity_grammar() {
    let mut root = open_session(TxnConfig::default(), true).unwrap();
    let out = run(
        &mut root,
        r#"{"op":"set_debug_verbosity","spec":"txn"}
{"op":"set_debug_verbosity","spec":"txn=1,whatever=3"}"#,
    )
    .await;

    assert_eq!(out[0]["sqlstate"], "42601");
    assert!(out[0]["message"].as_str().unwrap().contains("name=integer"));
    assert_eq!(out[1]["data"]["value"], 0);
    assert_eq!(root.verbosity().level("whatever"), 3);
}
