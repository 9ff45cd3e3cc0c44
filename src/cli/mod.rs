//! CLI module for aerotxn
//!
//! Provides command-line interface for:
//! - shell: one session driven by JSON statements on stdin
//! - check-config: validate a configuration file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, open_session, run, run_command, serve, shell};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response, write_txn_error};
