//! Observability for the transaction core
//!
//! - Structured JSON logging (`Logger`, typed `Event`s)
//! - Counters (`TxnMetrics`)
//! - Audit trail of privileged debug operations
//!
//! Observability is read-only with respect to transaction state: nothing in
//! here changes what a statement returns.
//!
//! ```ignore
//! use aerotxn::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::TxnBegin, &[("txn_id", "…")]);
//! ```

pub mod audit;
mod events;
mod logger;
mod metrics;

pub use audit::{AuditAction, AuditLog, AuditOutcome, AuditRecord, MemoryAuditLog};
pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, TxnMetrics};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}
