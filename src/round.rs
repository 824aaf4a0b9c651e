//! Round data model and events.
//!
//! A `Round` is the authoritative per-bet record owned by the round store.
//! Everything else in the system holds transient, possibly stale copies of
//! it for display and scheduling; settlement decisions are made only
//! against the store's copy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Basis-point denominator for house edge math (10_000 = 100%).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// 20-byte account address, displayed as 0x-prefixed hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; 20]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Address(arr))
    }
}

/// Authoritative round record.
///
/// Token quantities are 18-decimal fixed point carried as integer base
/// units; multipliers are scaled by 100 (150 = 1.50x).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Round {
    pub round_id: u64,
    pub player: Address,
    pub bet_amount: u128,
    pub client_seed: u64,
    /// Zero until the operator reveals it.
    pub server_seed: u64,
    /// Pre-bet commitment to the server seed. Recorded at placement when
    /// the operator published one; reveals are checked against it.
    pub server_seed_hash: Option<[u8; 32]>,
    /// Zero until revealed; immutable once set.
    pub crash_multiplier: u32,
    /// Zero unless the player cashed out.
    pub cash_out_multiplier: u32,
    /// Bet placement time, seconds since epoch.
    pub timestamp: u64,
    /// Terminal: once true no field may change.
    pub settled: bool,
    pub won: bool,
}

impl Round {
    /// True once the crash point has been disclosed.
    pub fn revealed(&self) -> bool {
        self.crash_multiplier > 0
    }

    /// True while the round can still be cashed out or settled.
    pub fn open(&self) -> bool {
        !self.settled
    }
}

/// Display-friendly outcome of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundOutcome {
    Pending,
    Won,
    Lost,
}

impl From<&Round> for RoundOutcome {
    fn from(round: &Round) -> Self {
        if !round.settled {
            RoundOutcome::Pending
        } else if round.won {
            RoundOutcome::Won
        } else {
            RoundOutcome::Lost
        }
    }
}

/// Events emitted by the round store's state-changing operations.
///
/// These mirror the contract event log; the lifecycle controller recovers
/// assigned round ids and actual winnings from them rather than
/// recomputing locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoundEvent {
    BetPlaced {
        round_id: u64,
        player: Address,
        amount: u128,
        client_seed: u64,
    },
    CrashRevealed {
        round_id: u64,
        crash_multiplier: u32,
        server_seed: u64,
    },
    CashedOut {
        round_id: u64,
        player: Address,
        multiplier: u32,
        winnings: u128,
    },
    RoundSettled {
        round_id: u64,
        won: bool,
        payout: u128,
    },
}

impl RoundEvent {
    /// Round id carried by the event, whichever variant it is.
    pub fn round_id(&self) -> u64 {
        match *self {
            RoundEvent::BetPlaced { round_id, .. }
            | RoundEvent::CrashRevealed { round_id, .. }
            | RoundEvent::CashedOut { round_id, .. }
            | RoundEvent::RoundSettled { round_id, .. } => round_id,
        }
    }
}

/// Aggregate house totals, as returned by the store's `get_stats`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GameStats {
    pub total_bets: u128,
    pub total_winnings: u128,
    pub total_losses: u128,
    pub liquidity: u128,
    pub current_round_id: u64,
}

/// Net winnings for a cash-out: `bet * multiplier / 100`, less the house
/// edge in basis points. Integer arithmetic throughout; the store owns the
/// rounding, callers must not reimplement it. An edge at or past the full
/// denominator clamps to a zero payout instead of underflowing.
pub fn compute_winnings(bet_amount: u128, multiplier: u32, house_edge_bps: u32) -> u128 {
    let edge = (house_edge_bps as u128).min(BPS_DENOMINATOR);
    let gross = bet_amount.saturating_mul(multiplier as u128) / 100;
    gross.saturating_mul(BPS_DENOMINATOR - edge) / BPS_DENOMINATOR
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn test_address_roundtrip() {
        let addr: Address = "0x8da112fca23e31785e9c69ca92c8f00e999bebf2".parse().unwrap();
        assert_eq!(addr.to_string(), "0x8da112fca23e31785e9c69ca92c8f00e999bebf2");
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn test_winnings_with_house_edge() {
        // 100 tokens at 2.50x with a 2% edge: 250 * 0.98 = 245 tokens.
        let winnings = compute_winnings(100 * ONE_TOKEN, 250, 200);
        assert_eq!(winnings, 245 * ONE_TOKEN);
    }

    #[test]
    fn test_winnings_zero_edge() {
        let winnings = compute_winnings(10 * ONE_TOKEN, 150, 0);
        assert_eq!(winnings, 15 * ONE_TOKEN);
    }

    #[test]
    fn test_winnings_edge_clamped_at_full_denominator() {
        // A 100% edge swallows the whole payout.
        assert_eq!(compute_winnings(10 * ONE_TOKEN, 250, 10_000), 0);
        // Past-full edges clamp to zero instead of underflowing.
        assert_eq!(compute_winnings(10 * ONE_TOKEN, 250, 60_000), 0);
    }

    #[test]
    fn test_outcome_classification() {
        let mut round = Round {
            round_id: 1,
            player: Address::default(),
            bet_amount: ONE_TOKEN,
            client_seed: 1,
            server_seed: 0,
            server_seed_hash: None,
            crash_multiplier: 0,
            cash_out_multiplier: 0,
            timestamp: 0,
            settled: false,
            won: false,
        };
        assert_eq!(RoundOutcome::from(&round), RoundOutcome::Pending);

        round.settled = true;
        assert_eq!(RoundOutcome::from(&round), RoundOutcome::Lost);

        round.won = true;
        round.cash_out_multiplier = 200;
        assert_eq!(RoundOutcome::from(&round), RoundOutcome::Won);
    }

    #[test]
    fn test_event_round_id() {
        let event = RoundEvent::RoundSettled {
            round_id: 7,
            won: false,
            payout: 0,
        };
        assert_eq!(event.round_id(), 7);
    }
}
