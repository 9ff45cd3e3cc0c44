//! Priority Policy
//!
//! Maps the symbolic user priority requested by BEGIN / SET TRANSACTION to the
//! numeric priority the conflict resolver compares.
//!
//! Bounds:
//! - Low is the minimum user priority, High the maximum, Normal the midpoint
//! - `Low < Normal < High` strictly
//! - Escalation on retry may push a priority past `MAX_USER_PRIORITY`; it
//!   saturates at `PRIORITY_CEILING` and never wraps

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::errors::{TxnError, TxnResult};

/// Lowest priority a user can request.
pub const MIN_USER_PRIORITY: u32 = 1;

/// Highest priority a user can request.
pub const MAX_USER_PRIORITY: u32 = 1 << 20;

/// Default priority, midway between the user bounds.
pub const NORMAL_USER_PRIORITY: u32 = (MIN_USER_PRIORITY + MAX_USER_PRIORITY) / 2;

/// Largest representable priority.
pub const PRIORITY_CEILING: u32 = u32::MAX;

/// Upper bound accepted for a single escalation step.
pub const MAX_ESCALATION_STEP: u32 = 1 << 16;

/// Numeric transaction priority.
///
/// Totally ordered. Higher wins conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(u32);

impl Priority {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    pub const fn low() -> Self {
        Self(MIN_USER_PRIORITY)
    }

    pub const fn normal() -> Self {
        Self(NORMAL_USER_PRIORITY)
    }

    pub const fn high() -> Self {
        Self(MAX_USER_PRIORITY)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::normal()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User priority as requested by a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserPriority {
    /// No priority clause given
    #[default]
    Unspecified,
    Low,
    Normal,
    High,
}

impl UserPriority {
    /// Parse a priority name as written in a statement.
    ///
    /// Names are case-insensitive. An empty name is `Unspecified`.
    pub fn from_name(name: &str) -> TxnResult<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(Self::Unspecified);
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            _ => Err(TxnError::unknown_priority(trimmed)),
        }
    }

    /// Parse an optional name; `None` is `Unspecified`.
    pub fn from_optional(name: Option<&str>) -> TxnResult<Self> {
        name.map_or(Ok(Self::Unspecified), Self::from_name)
    }

    /// Map to a numeric priority. `None` means keep the current value.
    pub fn to_priority(self) -> Option<Priority> {
        match self {
            Self::Unspecified => None,
            Self::Low => Some(Priority::low()),
            Self::Normal => Some(Priority::normal()),
            Self::High => Some(Priority::high()),
        }
    }
}

impl fmt::Display for UserPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => write!(f, "UNSPECIFIED"),
            Self::Low => write!(f, "LOW"),
            Self::Normal => write!(f, "NORMAL"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Raise a priority by a random step in `[1, max_step]`.
///
/// Pure in `(current, max_step, rng)`. A `max_step` of zero is treated as one,
/// and steps above `MAX_ESCALATION_STEP` are clamped to it.
pub fn escalate<R: Rng + ?Sized>(current: Priority, max_step: u32, rng: &mut R) -> Priority {
    let bound = max_step.clamp(1, MAX_ESCALATION_STEP);
    let step = rng.gen_range(1..=bound);
    Priority(current.0.saturating_add(step).min(PRIORITY_CEILING))
}
