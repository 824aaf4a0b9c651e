//! Round lifecycle controller.
//!
//! One controller per player. It drives a bet from placement through
//! cash-out against the round store, translating low-level failures into
//! the `GameError` taxonomy. It never treats its own copies of round state
//! as authoritative; after any abandoned wait it re-queries the store
//! before acting again.

use crate::errors::{GameError, GameResult};
use crate::round::{Address, GameStats, Round, RoundEvent};
use crate::store::{RoundStore, TokenLedger};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a confirmed bet placement.
#[derive(Clone, Debug)]
pub struct BetTicket {
    pub round_id: u64,
    pub tx_hash: String,
}

/// Outcome of a confirmed cash-out, with the winnings the store actually
/// paid (read from the event, never recomputed).
#[derive(Clone, Debug)]
pub struct CashOutTicket {
    pub winnings: u128,
    pub tx_hash: String,
}

pub struct GameController {
    store: Arc<dyn RoundStore>,
    ledger: Arc<dyn TokenLedger>,
    player: Address,
    /// Address the token ledger knows the store by; allowances are granted
    /// to it before betting.
    store_address: Address,
    confirmation_timeout: Duration,
}

impl GameController {
    pub fn new(
        store: Arc<dyn RoundStore>,
        ledger: Arc<dyn TokenLedger>,
        player: Address,
        store_address: Address,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            player,
            store_address,
            confirmation_timeout,
        }
    }

    pub fn player(&self) -> Address {
        self.player
    }

    /// Bounds a confirmation wait. Past the bound the operation may still
    /// have landed on the store; callers get `ContractUnavailable` and must
    /// `reconcile` before retrying.
    async fn confirm<T, F>(&self, fut: F) -> GameResult<T>
    where
        F: Future<Output = GameResult<T>>,
    {
        tokio::time::timeout(self.confirmation_timeout, fut)
            .await
            .map_err(|_| {
                GameError::ContractUnavailable(format!(
                    "no confirmation within {:?}",
                    self.confirmation_timeout
                ))
            })?
    }

    /// Places a bet of `amount` base units with the given client seed.
    ///
    /// Client-side range and balance checks are fast-fails only; the store
    /// re-validates regardless. If the token allowance is short, an
    /// approval is submitted and confirmed first, with its own error
    /// surface distinct from a rejected bet.
    pub async fn place_bet(&self, amount: u128, client_seed: u64) -> GameResult<BetTicket> {
        self.place_bet_with_commitment(amount, client_seed, None).await
    }

    /// `place_bet` with a pre-published server-seed commitment recorded on
    /// the round, binding the operator before the bet is visible.
    pub async fn place_bet_with_commitment(
        &self,
        amount: u128,
        client_seed: u64,
        server_seed_hash: Option<[u8; 32]>,
    ) -> GameResult<BetTicket> {
        let min = self.store.min_bet().await?;
        let max = self.store.max_bet().await?;
        if amount < min || amount > max {
            return Err(GameError::BetOutOfRange { amount, min, max });
        }

        let balance = self.ledger.balance_of(self.player).await?;
        if balance < amount {
            return Err(GameError::InsufficientBalance {
                needed: amount,
                available: balance,
            });
        }

        self.ensure_allowance(amount).await?;

        let receipt = self
            .confirm(self.store.place_bet(self.player, amount, client_seed, server_seed_hash))
            .await?;

        match receipt.bet_placed() {
            Some(&RoundEvent::BetPlaced { round_id, .. }) => {
                info!(round_id, amount, "bet placed");
                Ok(BetTicket {
                    round_id,
                    tx_hash: receipt.tx_hash,
                })
            }
            _ => {
                // Funds moved; this is not a failed bet. The caller must
                // reconcile via the player's round list.
                warn!(tx_hash = %receipt.tx_hash, "bet accepted but round id not found in events");
                Err(GameError::RoundIdIndeterminate {
                    tx_hash: receipt.tx_hash,
                })
            }
        }
    }

    async fn ensure_allowance(&self, amount: u128) -> GameResult<()> {
        let granted = self.ledger.allowance(self.player, self.store_address).await?;
        if granted >= amount {
            return Ok(());
        }

        debug!(granted, needed = amount, "allowance short, approving");
        self.confirm(self.ledger.approve(self.player, self.store_address, amount))
            .await
            .map_err(|e| match e {
                // The player declining the approval is still a rejection.
                GameError::UserRejected => GameError::UserRejected,
                other => GameError::ApprovalFailed(other.to_string()),
            })
    }

    /// Claims a win at `multiplier` (the client's locally tracked value,
    /// already truncated to the scaled-by-100 integer). The store is the
    /// sole arbiter of whether it beats the crash point.
    pub async fn cash_out(&self, round_id: u64, multiplier: u32) -> GameResult<CashOutTicket> {
        let round = self.store.get_round(round_id).await?;
        if round.settled {
            return Err(GameError::RoundAlreadySettled);
        }
        if round.cash_out_multiplier > 0 {
            return Err(GameError::AlreadyCashedOut);
        }

        let receipt = self.confirm(self.store.cash_out(round_id, multiplier)).await?;

        match receipt.cashed_out() {
            Some(&RoundEvent::CashedOut { winnings, .. }) => {
                info!(round_id, multiplier, winnings, "cashed out");
                Ok(CashOutTicket {
                    winnings,
                    tx_hash: receipt.tx_hash,
                })
            }
            // A confirmed cash-out always carries its event; treat a bare
            // receipt as a store bug rather than guessing at winnings.
            _ => Err(GameError::Unknown(format!(
                "cash-out tx {} confirmed without CashedOut event",
                receipt.tx_hash
            ))),
        }
    }

    /// Re-reads authoritative round state. Called after a timed-out or
    /// abandoned submission, before any retry, so an operation that did
    /// land is never doubled.
    pub async fn reconcile(&self, round_id: u64) -> GameResult<Round> {
        self.store.get_round(round_id).await
    }

    /// Recovers the most recently assigned round id for this player.
    /// This is the reconciliation path for `RoundIdIndeterminate`.
    pub async fn recover_round_id(&self) -> GameResult<u64> {
        self.store
            .get_player_rounds(self.player)
            .await?
            .last()
            .copied()
            .ok_or(GameError::Unknown("player has no rounds".to_string()))
    }

    pub async fn bet_limits(&self) -> GameResult<(u128, u128)> {
        Ok((self.store.min_bet().await?, self.store.max_bet().await?))
    }

    pub async fn stats(&self) -> GameResult<GameStats> {
        self.store.get_stats().await
    }

    /// Full round records for this player, newest last.
    pub async fn player_history(&self) -> GameResult<Vec<Round>> {
        let ids = self.store.get_player_rounds(self.player).await?;
        let mut rounds = Vec::with_capacity(ids.len());
        for id in ids {
            rounds.push(self.store.get_round(id).await?);
        }
        Ok(rounds)
    }
}
