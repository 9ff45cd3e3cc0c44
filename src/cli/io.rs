//! JSON-lines I/O for the shell
//!
//! - Input: one JSON statement per line
//! - Output: one JSON response per line
//! - UTF-8 only

use std::io::Write;

use serde_json::{json, Value};

use super::errors::CliResult;
use crate::txn::TxnError;

/// Write a success response
pub fn write_response<W: Write>(out: &mut W, data: Value) -> CliResult<()> {
    let response = json!({
        "status": "ok",
        "data": data
    });
    write_line(out, &response)
}

/// Write an error response
pub fn write_error<W: Write>(out: &mut W, code: &str, message: &str) -> CliResult<()> {
    let response = json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_line(out, &response)
}

/// Write a statement error, with its SQLSTATE and conflict winner
pub fn write_txn_error<W: Write>(out: &mut W, err: &TxnError) -> CliResult<()> {
    let mut response = json!({
        "status": "error",
        "code": err.code(),
        "sqlstate": err.sqlstate(),
        "message": err.message,
        "retryable": err.is_retryable()
    });
    if let Some(winner) = err.winner {
        response["winner"] = Value::String(winner.to_string());
    }
    write_line(out, &response)
}

fn write_line<W: Write>(out: &mut W, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
