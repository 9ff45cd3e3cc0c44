//! Isolation Policy
//!
//! Maps the isolation level requested by BEGIN / SET TRANSACTION to the
//! isolation tag carried by the transaction record and the KV read/write path.
//!
//! `Unspecified` maps to nothing: it leaves the record's current isolation
//! untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{TxnError, TxnResult};

/// Isolation level as requested by a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// No isolation clause given
    #[default]
    Unspecified,
    /// SNAPSHOT
    Snapshot,
    /// SERIALIZABLE
    Serializable,
}

impl IsolationLevel {
    /// Parse an isolation level name as written in a statement.
    ///
    /// Names are case-insensitive. An empty name is `Unspecified`.
    pub fn from_name(name: &str) -> TxnResult<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(Self::Unspecified);
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "SNAPSHOT" => Ok(Self::Snapshot),
            "SERIALIZABLE" => Ok(Self::Serializable),
            _ => Err(TxnError::unknown_isolation(trimmed)),
        }
    }

    /// Parse an optional name; `None` is `Unspecified`.
    pub fn from_optional(name: Option<&str>) -> TxnResult<Self> {
        name.map_or(Ok(Self::Unspecified), Self::from_name)
    }

    /// Map to the record's isolation tag. `None` means keep the current value.
    pub fn to_isolation_type(self) -> Option<IsolationType> {
        match self {
            Self::Unspecified => None,
            Self::Snapshot => Some(IsolationType::Snapshot),
            Self::Serializable => Some(IsolationType::Serializable),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => write!(f, "UNSPECIFIED"),
            Self::Snapshot => write!(f, "SNAPSHOT"),
            Self::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// Isolation carried by a transaction record.
///
/// Snapshot does not protect against write skew; Serializable does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationType {
    #[default]
    Serializable,
    Snapshot,
}

impl IsolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serializable => "SERIALIZABLE",
            Self::Snapshot => "SNAPSHOT",
        }
    }
}

impl fmt::Display for IsolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
