//! CLI command implementations
//!
//! `shell` runs a single session over stdin/stdout against the in-memory KV
//! layer. One statement per input line, one response per output line. The
//! session is disconnected when input ends, rolling back anything still open.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::TxnConfig;
use crate::kv::MemoryKv;
use crate::observability::{log_event_with_fields, Event, Logger, TxnMetrics};
use crate::session::{Session, SessionContext};
use crate::statement::{self, Statement};
use crate::txn::TxnError;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_response, write_txn_error};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run a parsed command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Shell { config, root } => shell(&config, root),
        Command::CheckConfig { config } => check_config(&config),
    }
}

/// Validate a configuration file and print the effective values
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = TxnConfig::load(config_path)?;
    let mut stdout = io::stdout();
    write_response(&mut stdout, serde_json::to_value(&config)?)
}

/// Run an interactive session on stdin/stdout
pub fn shell(config_path: &Path, root: bool) -> CliResult<()> {
    // stdout carries statement responses only.
    Logger::route_all_to_stderr(true);
    let config = TxnConfig::load(config_path)?;
    let max_retries = config.max_retries.to_string();
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("path", &config_path.display().to_string()),
            ("max_retries", &max_retries),
        ],
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::runtime_error(format!("Failed to start runtime: {}", e)))?;

    let mut session = open_session(config, root)?;
    log_event_with_fields(
        Event::ShellStart,
        &[
            ("session_id", &session.context().session_id.to_string()),
            ("privilege", session.context().privilege.as_str()),
        ],
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let served = runtime.block_on(serve(&mut session, stdin.lock(), &mut stdout));

    session.disconnect();
    let metrics = serde_json::to_string(&session.metrics().snapshot())?;
    log_event_with_fields(Event::ShellStop, &[("metrics", &metrics)]);
    served
}

/// Build the shell's session over a fresh in-memory store
pub fn open_session(config: TxnConfig, root: bool) -> CliResult<Session> {
    let metrics = Arc::new(TxnMetrics::new());
    let kv = MemoryKv::new().with_metrics(Arc::clone(&metrics));
    let ctx = if root {
        SessionContext::root()
    } else {
        SessionContext::user()
    };
    Ok(Session::try_new(ctx, Arc::new(kv), config)?.with_metrics(metrics))
}

/// Execute statements from `input` until it ends, writing one response each.
///
/// Malformed lines get a syntax error response; blank lines are skipped.
pub async fn serve<R: BufRead, W: Write>(
    session: &mut Session,
    input: R,
    out: &mut W,
) -> CliResult<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let stmt: Statement = match serde_json::from_str(&line) {
            Ok(stmt) => stmt,
            Err(e) => {
                write_txn_error(out, &TxnError::syntax(format!("invalid statement: {}", e)))?;
                continue;
            }
        };

        match statement::execute(session, &stmt).await {
            Ok(result) => write_response(out, serde_json::to_value(&result)?)?,
            Err(err) => write_txn_error(out, &err)?,
        }
    }
    Ok(())
}
