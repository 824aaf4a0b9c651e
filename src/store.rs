//! Round store and token ledger interfaces.
//!
//! The round store is the single shared mutable resource in the system: it
//! is mutated by many lifecycle controllers (one per player) and by the one
//! auto-revealer, and it alone serializes state-changing calls per round.
//! Whichever transaction it accepts first wins; the loser gets a specific
//! race error back, never corrupted state.

use crate::errors::GameResult;
use crate::round::{Address, GameStats, Round, RoundEvent};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Receipt for a confirmed state-changing call.
///
/// Carries the events the call emitted. Callers recover assigned round ids
/// and actual winnings from these events; the store owns the rounding
/// rules, so recomputing amounts locally is always wrong.
#[derive(Clone, Debug)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub events: Vec<RoundEvent>,
}

impl TxReceipt {
    /// First `BetPlaced` event in the receipt, if any.
    pub fn bet_placed(&self) -> Option<&RoundEvent> {
        self.events
            .iter()
            .find(|e| matches!(e, RoundEvent::BetPlaced { .. }))
    }

    /// First `CashedOut` event in the receipt, if any.
    pub fn cashed_out(&self) -> Option<&RoundEvent> {
        self.events
            .iter()
            .find(|e| matches!(e, RoundEvent::CashedOut { .. }))
    }
}

/// Authoritative per-round ledger, keyed by round id.
///
/// Implementations must be idempotent against duplicate submission: a
/// second `reveal_crash` for an already-revealed round is a no-op, and a
/// duplicate `cash_out`/`settle_loss` is rejected with the matching race
/// error rather than applied twice.
#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Places a bet, pulling `amount` from the player's token balance.
    /// Assigns the next round id and emits `BetPlaced` carrying it.
    async fn place_bet(
        &self,
        player: Address,
        amount: u128,
        client_seed: u64,
        server_seed_hash: Option<[u8; 32]>,
    ) -> GameResult<TxReceipt>;

    /// Discloses the server seed and fixes the crash multiplier. One-time:
    /// revealing an already-revealed round changes nothing. When a
    /// commitment was recorded at bet time the seed must hash to it.
    async fn reveal_crash(&self, round_id: u64, server_seed: u64) -> GameResult<TxReceipt>;

    /// Claims a win at `multiplier` (scaled by 100). The store validates
    /// the multiplier against the revealed crash point and pays out net of
    /// the house edge. Emits `CashedOut` with the actual winnings.
    async fn cash_out(&self, round_id: u64, multiplier: u32) -> GameResult<TxReceipt>;

    /// Settles a revealed, uncashed round as a loss. Mutually exclusive
    /// with `cash_out`: the second of the two to arrive is rejected.
    async fn settle_loss(&self, round_id: u64) -> GameResult<TxReceipt>;

    async fn get_round(&self, round_id: u64) -> GameResult<Round>;

    async fn get_player_rounds(&self, player: Address) -> GameResult<Vec<u64>>;

    async fn get_stats(&self) -> GameResult<GameStats>;

    /// Next round id to be assigned.
    async fn current_round_id(&self) -> GameResult<u64>;

    async fn min_bet(&self) -> GameResult<u128>;

    async fn max_bet(&self) -> GameResult<u128>;

    /// House edge in basis points (200 = 2%).
    async fn house_edge(&self) -> GameResult<u32>;

    /// Subscribes to the store's event log. Every state-changing call that
    /// emits events also publishes them here, in submission order.
    fn subscribe(&self) -> broadcast::Receiver<RoundEvent>;
}

/// External fungible-token ledger the round store settles against.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn balance_of(&self, owner: Address) -> GameResult<u128>;

    async fn allowance(&self, owner: Address, spender: Address) -> GameResult<u128>;

    /// Grants `spender` the right to pull up to `amount` from `owner`.
    async fn approve(&self, owner: Address, spender: Address, amount: u128) -> GameResult<()>;

    /// Pulls `amount` from `owner` to `to`, consuming `spender`'s
    /// allowance. Used by the round store at bet placement.
    async fn transfer_from(
        &self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: u128,
    ) -> GameResult<()>;
}
