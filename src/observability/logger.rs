//! Structured JSON logger
//!
//! - One log line = one JSON object = one event
//! - Keys sorted, so identical events render identically
//! - Synchronous, unbuffered
//! - ERROR and FATAL go to stderr, everything else to stdout, unless
//!   every line is routed to stderr (the shell keeps stdout for responses)

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Verbosity-gated detail
    Trace = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    /// Process is about to die
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    fn to_stderr(&self) -> bool {
        *self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static ALL_TO_STDERR: AtomicBool = AtomicBool::new(false);

/// JSON-lines logger.
pub struct Logger;

impl Logger {
    /// Route every severity to stderr, leaving stdout to the caller.
    pub fn route_all_to_stderr(enabled: bool) {
        ALL_TO_STDERR.store(enabled, Ordering::Relaxed);
    }

    fn uses_stderr(severity: Severity) -> bool {
        severity.to_stderr() || ALL_TO_STDERR.load(Ordering::Relaxed)
    }

    /// Log an event with the given severity and fields.
    ///
    /// `event` and `severity` are reserved keys; a field using either name is
    /// dropped.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let line = Self::render(severity, event, fields);
        if Self::uses_stderr(severity) {
            Self::write_line(&mut io::stderr().lock(), &line);
        } else {
            Self::write_line(&mut io::stdout().lock(), &line);
        }
    }

    fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut object = Map::new();
        for (key, value) in fields {
            object.insert((*key).to_string(), Value::String((*value).to_string()));
        }
        object.insert("event".to_string(), Value::String(event.to_string()));
        object.insert(
            "severity".to_string(),
            Value::String(severity.as_str().to_string()),
        );
        let mut line = Value::Object(object).to_string();
        line.push('\n');
        line
    }

    fn write_line<W: Write>(writer: &mut W, line: &str) {
        // Logging failures never reach the caller.
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Fatal, event, fields);
    }
}

/// Render a log line without writing it, for tests
#[cfg(test)]
pub fn capture_log(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    Logger::render(severity, event, fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_log_json_format() {
        let output = capture_log(Severity::Info, "TXN_BEGIN", &[("txn_id", "abc")]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "TXN_BEGIN");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["txn_id"], "abc");
    }

    #[test]
    fn test_field_order_is_irrelevant() {
        let a = capture_log(Severity::Warn, "E", &[("zebra", "1"), ("apple", "2")]);
        let b = capture_log(Severity::Warn, "E", &[("apple", "2"), ("zebra", "1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_reserved_keys_win() {
        let output = capture_log(Severity::Error, "REAL", &[("event", "FAKE")]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "REAL");
    }

    #[test]
    fn test_escapes_and_single_line() {
        let output = capture_log(Severity::Info, "E", &[("message", "a \"b\"\nc")]);
        assert_eq!(output.matches('\n').count(), 1);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["message"], "a \"b\"\nc");
    }

    #[test]
    fn test_stderr_routing() {
        assert!(Severity::Fatal.to_stderr());
        assert!(Severity::Error.to_stderr());
        assert!(!Severity::Warn.to_stderr());
    }

    #[test]
    fn test_route_all_to_stderr() {
        Logger::route_all_to_stderr(true);
        assert!(Logger::uses_stderr(Severity::Trace));
        assert!(Logger::uses_stderr(Severity::Info));
        assert!(Logger::uses_stderr(Severity::Warn));

        Logger::route_all_to_stderr(false);
        assert!(!Logger::uses_stderr(Severity::Info));
        assert!(Logger::uses_stderr(Severity::Error));
    }
}
