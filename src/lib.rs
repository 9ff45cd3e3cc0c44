//! aerotxn - session transaction core
//!
//! Per-session transaction lifecycle over an external key-value layer:
//! - `txn`: isolation and priority policies, transaction records, errors
//! - `session`: the session transaction state machine
//! - `conflict`: conflict resolution and retry budget
//! - `debug`: privilege-gated debug injection
//! - `statement`: client statements and implicit transactions
//! - `kv`: KV layer interface and an in-memory implementation
//! - `config`, `observability`, `cli`: ambient plumbing

pub mod cli;
pub mod config;
pub mod conflict;
pub mod debug;
pub mod kv;
pub mod observability;
pub mod session;
pub mod statement;
pub mod txn;
