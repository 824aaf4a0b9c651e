//! Error taxonomy for the round lifecycle.
//!
//! Callers of the controller see exactly these variants, never raw
//! transport errors. Races lost against the auto-revealer
//! (`RoundAlreadySettled`, `AlreadyCashedOut`) and the in-game crash
//! outcome (`TooLateCrashed`) are ordinary results of play, not faults.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("Transaction rejected by user")]
    UserRejected,

    #[error("Insufficient balance: need {needed} base units, have {available}")]
    InsufficientBalance { needed: u128, available: u128 },

    #[error("Insufficient allowance: need {needed} base units, granted {granted}")]
    InsufficientAllowance { needed: u128, granted: u128 },

    #[error("Token approval failed: {0}")]
    ApprovalFailed(String),

    #[error("Bet amount {amount} outside allowed range [{min}, {max}]")]
    BetOutOfRange { amount: u128, min: u128, max: u128 },

    #[error("Round already cashed out")]
    AlreadyCashedOut,

    #[error("Round already settled")]
    RoundAlreadySettled,

    #[error("Crashed at {crash}: cash-out at {submitted} is too late")]
    TooLateCrashed { submitted: u32, crash: u32 },

    #[error("Round {0} not found")]
    RoundNotFound(u64),

    #[error("Crash point for round {0} not yet revealed")]
    NotRevealed(u64),

    #[error("Revealed server seed does not match its commitment")]
    CommitmentMismatch,

    #[error("Contract unavailable: {0}")]
    ContractUnavailable(String),

    #[error("Bet accepted but round id could not be determined from tx {tx_hash}")]
    RoundIdIndeterminate { tx_hash: String },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GameError {
    /// Errors worth retrying after a delay. Everything else is either a
    /// final game outcome or a precondition the caller must fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GameError::ContractUnavailable(_))
    }

    /// True for the "too slow" family: a concurrent state change beat this
    /// call to the store. Surfaced to the player, never alarmed on.
    pub fn is_race_loss(&self) -> bool {
        matches!(
            self,
            GameError::RoundAlreadySettled
                | GameError::AlreadyCashedOut
                | GameError::TooLateCrashed { .. }
        )
    }
}

/// Maps a raw transport/provider error string onto the taxonomy.
///
/// Pure function so the mapping is testable without a live connection.
/// Matches the revert reasons and provider codes the reference contract
/// and wallet stack emit.
pub fn classify_transport_error(raw: &str) -> GameError {
    let lower = raw.to_lowercase();

    if lower.contains("action_rejected") || lower.contains("rejected by user") {
        GameError::UserRejected
    } else if lower.contains("insufficient balance") || lower.contains("insufficient funds") {
        GameError::InsufficientBalance { needed: 0, available: 0 }
    } else if lower.contains("insufficient allowance") {
        GameError::InsufficientAllowance { needed: 0, granted: 0 }
    } else if lower.contains("invalid bet amount") {
        GameError::BetOutOfRange { amount: 0, min: 0, max: 0 }
    } else if lower.contains("multiplier too high") {
        GameError::TooLateCrashed { submitted: 0, crash: 0 }
    } else if lower.contains("already cashed out") {
        GameError::AlreadyCashedOut
    } else if lower.contains("already settled") {
        GameError::RoundAlreadySettled
    } else if lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("missing revert data")
        || lower.contains("no bytecode")
    {
        GameError::ContractUnavailable(raw.to_string())
    } else {
        GameError::Unknown(raw.to_string())
    }
}

pub type GameResult<T> = Result<T, GameError>;
