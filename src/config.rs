//! Transaction core configuration
//!
//! Loaded from a JSON file, validated once, immutable afterwards. Every field
//! has a default, so `{}` is a valid configuration.
//!
//! ```json
//! {
//!   "max_retries": 10,
//!   "max_escalation_step": 1024,
//!   "default_isolation": "serializable",
//!   "debug_verbosity": "txn=1"
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cli::{CliError, CliResult};
use crate::conflict::RetryPolicy;
use crate::debug::VerbosityMap;
use crate::txn::{IsolationLevel, IsolationType, MAX_ESCALATION_STEP};

/// Default retry budget per logical transaction.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default upper bound of one priority escalation step.
pub const DEFAULT_MAX_ESCALATION_STEP: u32 = 1024;

/// Transaction core configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnConfig {
    /// Retries allowed per logical transaction before it fails terminally
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound of the random priority increment applied on retry
    #[serde(default = "default_max_escalation_step")]
    pub max_escalation_step: u32,

    /// Isolation of a new transaction when BEGIN names none
    #[serde(default = "default_isolation")]
    pub default_isolation: String,

    /// Initial verbosity spec (`name=integer,...`)
    #[serde(default)]
    pub debug_verbosity: Option<String>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_max_escalation_step() -> u32 {
    DEFAULT_MAX_ESCALATION_STEP
}
fn default_isolation() -> String {
    "serializable".to_string()
}

impl Default for TxnConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_escalation_step: default_max_escalation_step(),
            default_isolation: default_isolation(),
            debug_verbosity: None,
        }
    }
}

impl TxnConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration JSON
    pub fn from_json(content: &str) -> CliResult<Self> {
        let config: TxnConfig = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field ranges and names
    pub fn validate(&self) -> CliResult<()> {
        if self.max_retries == 0 {
            return Err(CliError::config_error("max_retries must be > 0"));
        }

        if self.max_escalation_step == 0 || self.max_escalation_step > MAX_ESCALATION_STEP {
            return Err(CliError::config_error(format!(
                "max_escalation_step must be in 1..={}",
                MAX_ESCALATION_STEP
            )));
        }

        self.isolation().map_err(|e| CliError::config_error(e.message))?;

        if let Some(spec) = &self.debug_verbosity {
            VerbosityMap::parse(spec)
                .map_err(|e| CliError::config_error(format!("debug_verbosity: {}", e.message)))?;
        }

        Ok(())
    }

    /// Isolation applied to a new transaction when BEGIN names none.
    pub fn isolation(&self) -> crate::txn::TxnResult<IsolationType> {
        let level = IsolationLevel::from_name(&self.default_isolation)?;
        Ok(level.to_isolation_type().unwrap_or_default())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }

    /// Initial verbosity map; an invalid spec yields an empty map.
    pub fn verbosity(&self) -> VerbosityMap {
        self.debug_verbosity
            .as_deref()
            .and_then(|spec| VerbosityMap::parse(spec).ok())
            .unwrap_or_default()
    }
}
