//! Conflict & Retry Controller
//!
//! Decides which of two contending transactions loses, and bounds how often a
//! loser may come back.
//!
//! Resolution rules:
//! - Strictly lower priority loses
//! - Exact tie: an independent fair coin flip per conflict, never a fixed
//!   side, so equal-priority pairs do not starve one another
//!
//! Resolution is a pure function of the two contenders and a random source.
//! It touches no shared state, so independent conflicts resolve concurrently
//! without coordination. Detection of the conflict itself belongs to the KV
//! layer.
//!
//! Liveness comes from escalation: the loser's next epoch runs at a strictly
//! higher priority (see `txn::escalate`), so a tied pair diverges after one
//! retry and the next conflict between them is decided by comparison.

use rand::Rng;

use crate::observability::{Event, Logger};
use crate::txn::{Epoch, TxnError, TxnMeta, TxnResult};

/// Why the loser lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionReason {
    /// Loser had strictly lower priority
    LowerPriority,
    /// Priorities were equal; decided by coin flip
    TieBreak,
}

impl ResolutionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowerPriority => "lower_priority",
            Self::TieBreak => "tie_break",
        }
    }
}

/// Outcome of one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub winner: TxnMeta,
    pub loser: TxnMeta,
    pub reason: ResolutionReason,
}

impl Resolution {
    /// Whether `meta` is the losing side.
    pub fn is_loser(&self, meta: &TxnMeta) -> bool {
        self.loser.id == meta.id
    }

    /// Build the error handed to the losing transaction.
    pub fn loser_error(&self) -> TxnError {
        TxnError::retryable(
            format!(
                "transaction {} (epoch {}) lost conflict to {} ({}); restart transaction",
                self.loser.id,
                self.loser.epoch,
                self.winner.id,
                self.reason.as_str()
            ),
            Some(self.winner.id),
        )
    }
}

/// Conflict resolver.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Decide the loser between two contenders.
    ///
    /// `rng` is consulted only on a priority tie.
    pub fn resolve<R: Rng + ?Sized>(a: TxnMeta, b: TxnMeta, rng: &mut R) -> Resolution {
        if a.priority != b.priority {
            let (winner, loser) = if a.priority > b.priority { (a, b) } else { (b, a) };
            return Resolution {
                winner,
                loser,
                reason: ResolutionReason::LowerPriority,
            };
        }

        let (winner, loser) = if rng.gen_bool(0.5) { (a, b) } else { (b, a) };
        Resolution {
            winner,
            loser,
            reason: ResolutionReason::TieBreak,
        }
    }

    /// Emit the structured log line for a resolution.
    pub fn log(resolution: &Resolution) {
        let winner = resolution.winner.id.to_string();
        let loser = resolution.loser.id.to_string();
        let winner_priority = resolution.winner.priority.to_string();
        let loser_priority = resolution.loser.priority.to_string();
        Logger::info(
            Event::ConflictResolved.as_str(),
            &[
                ("winner", &winner),
                ("winner_priority", &winner_priority),
                ("loser", &loser),
                ("loser_priority", &loser_priority),
                ("reason", resolution.reason.as_str()),
            ],
        );
    }
}

/// Retry budget, counted in retries.
///
/// The budget itself is external policy (configuration); this only enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Check whether a transaction currently at `epoch` may start another one.
    pub fn check(&self, epoch: Epoch) -> TxnResult<()> {
        if epoch.value() >= self.max_retries {
            return Err(TxnError::retry_limit_exceeded(epoch.value()));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_RETRIES)
    }
}
