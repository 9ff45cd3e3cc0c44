//! CLI argument definitions using clap
//!
//! Commands:
//! - aerotxn shell --config <path> [--root]
//! - aerotxn check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aerotxn - session transaction core
#[derive(Parser, Debug)]
#[command(name = "aerotxn")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one session reading JSON statements from stdin
    Shell {
        /// Path to configuration file
        #[arg(long, default_value = "./aerotxn.json")]
        config: PathBuf,

        /// Open the session with root privilege (enables debug injection)
        #[arg(long)]
        root: bool,
    },

    /// Validate a configuration file and print the effective values
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./aerotxn.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
