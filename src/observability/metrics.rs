//! Transaction metrics
//!
//! - Counters only, monotonic, reset on process start
//! - Shared across sessions behind an `Arc`; Relaxed atomics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Transaction counters
#[derive(Debug, Default)]
pub struct TxnMetrics {
    begins: AtomicU64,
    implicit_txns: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    aborts: AtomicU64,
    retryable_aborts: AtomicU64,
    retries: AtomicU64,
    retry_limit_exceeded: AtomicU64,
    conflicts_resolved: AtomicU64,
    debug_injections: AtomicU64,
    privilege_denials: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub begins: u64,
    pub implicit_txns: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub aborts: u64,
    pub retryable_aborts: u64,
    pub retries: u64,
    pub retry_limit_exceeded: u64,
    pub conflicts_resolved: u64,
    pub debug_injections: u64,
    pub privilege_denials: u64,
}

impl TxnMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_begins(&self) {
        self.begins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_implicit_txns(&self) {
        self.implicit_txns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rollbacks(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_aborts(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retryable_aborts(&self) {
        self.retryable_aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retry_limit_exceeded(&self) {
        self.retry_limit_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_conflicts_resolved(&self) {
        self.conflicts_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_debug_injections(&self) {
        self.debug_injections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_privilege_denials(&self) {
        self.privilege_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            begins: self.begins.load(Ordering::Relaxed),
            implicit_txns: self.implicit_txns.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            retryable_aborts: self.retryable_aborts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            retry_limit_exceeded: self.retry_limit_exceeded.load(Ordering::Relaxed),
            conflicts_resolved: self.conflicts_resolved.load(Ordering::Relaxed),
            debug_injections: self.debug_injections.load(Ordering::Relaxed),
            privilege_denials: self.privilege_denials.load(Ordering::Relaxed),
        }
    }
}
