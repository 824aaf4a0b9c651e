//! In-memory round store and token ledger.
//!
//! `MemoryRoundStore` implements the full contract semantics in process:
//! per-round serialization, one-time reveal, commitment enforcement, and
//! first-call-wins settlement. It backs the test suite and the revealer
//! binary's local simulation mode; a chain-backed `RoundStore` drops in
//! behind the same trait for a real deployment.

use crate::errors::{GameError, GameResult};
use crate::fairness;
use crate::round::{compute_winnings, Address, GameStats, Round, RoundEvent};
use crate::store::{RoundStore, TokenLedger, TxReceipt};
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Store parameters fixed at deployment.
#[derive(Clone, Debug)]
pub struct StoreParams {
    pub min_bet: u128,
    pub max_bet: u128,
    /// Basis points withheld from winnings (200 = 2%).
    pub house_edge_bps: u32,
    /// Address holding the house bankroll.
    pub house: Address,
}

impl Default for StoreParams {
    fn default() -> Self {
        Self {
            min_bet: ONE_TOKEN,            // 1 token
            max_bet: 1_000 * ONE_TOKEN,    // 1000 tokens
            house_edge_bps: 200,
            house: Address([0x11; 20]),
        }
    }
}

// All round and stats mutation goes through this single guarded struct, so
// racing calls on one round resolve in arrival order.
struct StoreState {
    rounds: HashMap<u64, Round>,
    player_rounds: HashMap<Address, Vec<u64>>,
    stats: GameStats,
}

pub struct MemoryRoundStore {
    params: StoreParams,
    ledger: Arc<dyn TokenLedger>,
    state: Mutex<StoreState>,
    tx_counter: AtomicU64,
    events: broadcast::Sender<RoundEvent>,
}

impl MemoryRoundStore {
    pub fn new(params: StoreParams, ledger: Arc<dyn TokenLedger>) -> Self {
        let (events, _) = broadcast::channel(1_024);
        Self {
            params,
            ledger,
            state: Mutex::new(StoreState {
                rounds: HashMap::new(),
                player_rounds: HashMap::new(),
                stats: GameStats::default(),
            }),
            tx_counter: AtomicU64::new(0),
            events,
        }
    }

    pub fn params(&self) -> &StoreParams {
        &self.params
    }

    fn next_tx_hash(&self, op: &str) -> String {
        let nonce = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(op.as_bytes());
        hasher.update(nonce.to_be_bytes());
        format!("0x{}", hex::encode(&hasher.finalize()[..20]))
    }

    fn emit(&self, events: &[RoundEvent]) {
        for event in events {
            // No subscribers is fine; the log is advisory.
            let _ = self.events.send(event.clone());
        }
    }

    fn receipt(&self, op: &str, events: Vec<RoundEvent>) -> TxReceipt {
        self.emit(&events);
        TxReceipt {
            tx_hash: self.next_tx_hash(op),
            events,
        }
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

#[async_trait]
impl RoundStore for MemoryRoundStore {
    async fn place_bet(
        &self,
        player: Address,
        amount: u128,
        client_seed: u64,
        server_seed_hash: Option<[u8; 32]>,
    ) -> GameResult<TxReceipt> {
        if amount < self.params.min_bet || amount > self.params.max_bet {
            return Err(GameError::BetOutOfRange {
                amount,
                min: self.params.min_bet,
                max: self.params.max_bet,
            });
        }

        // Pull the stake before the round exists, as the contract does.
        self.ledger
            .transfer_from(self.params.house, player, self.params.house, amount)
            .await?;

        let mut state = self.state.lock().expect("store state poisoned");
        let round_id = state.stats.current_round_id;
        state.stats.current_round_id += 1;
        state.stats.total_bets += amount;
        state.stats.liquidity += amount;

        state.rounds.insert(
            round_id,
            Round {
                round_id,
                player,
                bet_amount: amount,
                client_seed,
                server_seed: 0,
                server_seed_hash,
                crash_multiplier: 0,
                cash_out_multiplier: 0,
                timestamp: Self::now_secs(),
                settled: false,
                won: false,
            },
        );
        state.player_rounds.entry(player).or_default().push(round_id);
        drop(state);

        Ok(self.receipt(
            "place_bet",
            vec![RoundEvent::BetPlaced {
                round_id,
                player,
                amount,
                client_seed,
            }],
        ))
    }

    async fn reveal_crash(&self, round_id: u64, server_seed: u64) -> GameResult<TxReceipt> {
        let mut state = self.state.lock().expect("store state poisoned");
        let round = state
            .rounds
            .get_mut(&round_id)
            .ok_or(GameError::RoundNotFound(round_id))?;

        // One-time operation: a duplicate reveal is a no-op, not an error.
        // The receipt still carries a real hash, only no events.
        if round.crash_multiplier > 0 {
            return Ok(TxReceipt {
                tx_hash: self.next_tx_hash("reveal_crash"),
                events: vec![],
            });
        }
        if round.settled {
            return Err(GameError::RoundAlreadySettled);
        }
        if let Some(commitment) = round.server_seed_hash {
            if !fairness::verify_commitment(server_seed, &commitment) {
                return Err(GameError::CommitmentMismatch);
            }
        }

        round.server_seed = server_seed;
        round.crash_multiplier = fairness::derive_crash_point(round.client_seed, server_seed);
        let crash_multiplier = round.crash_multiplier;
        drop(state);

        Ok(self.receipt(
            "reveal_crash",
            vec![RoundEvent::CrashRevealed {
                round_id,
                crash_multiplier,
                server_seed,
            }],
        ))
    }

    async fn cash_out(&self, round_id: u64, multiplier: u32) -> GameResult<TxReceipt> {
        let (player, winnings, liquidity_drawn, events) = {
            let mut state = self.state.lock().expect("store state poisoned");
            let round = state
                .rounds
                .get_mut(&round_id)
                .ok_or(GameError::RoundNotFound(round_id))?;

            if round.settled {
                return Err(GameError::RoundAlreadySettled);
            }
            if round.cash_out_multiplier > 0 {
                return Err(GameError::AlreadyCashedOut);
            }
            if round.crash_multiplier == 0 {
                // Commitment-enforced reveal means the store cannot invent
                // the seed here; the claim has to wait for the revealer.
                return Err(GameError::NotRevealed(round_id));
            }
            if multiplier == 0 || multiplier >= round.crash_multiplier {
                return Err(GameError::TooLateCrashed {
                    submitted: multiplier,
                    crash: round.crash_multiplier,
                });
            }

            round.cash_out_multiplier = multiplier;
            round.settled = true;
            round.won = true;
            let player = round.player;
            let bet_amount = round.bet_amount;

            let winnings = compute_winnings(bet_amount, multiplier, self.params.house_edge_bps);
            let liquidity_drawn = state.stats.liquidity.min(winnings);
            state.stats.total_winnings += winnings;
            state.stats.liquidity -= liquidity_drawn;

            (
                player,
                winnings,
                liquidity_drawn,
                vec![
                    RoundEvent::CashedOut {
                        round_id,
                        player,
                        multiplier,
                        winnings,
                    },
                    RoundEvent::RoundSettled {
                        round_id,
                        won: true,
                        payout: winnings,
                    },
                ],
            )
        };

        // The lock cannot be held across the payout await, so the claim is
        // recorded first and unwound if the transfer fails; a round must
        // never read settled-and-won with the winnings unpaid.
        if let Err(e) = self
            .ledger
            .transfer_from(self.params.house, self.params.house, player, winnings)
            .await
        {
            let mut state = self.state.lock().expect("store state poisoned");
            if let Some(round) = state.rounds.get_mut(&round_id) {
                round.cash_out_multiplier = 0;
                round.settled = false;
                round.won = false;
            }
            state.stats.total_winnings -= winnings;
            state.stats.liquidity += liquidity_drawn;
            return Err(e);
        }

        Ok(self.receipt("cash_out", events))
    }

    async fn settle_loss(&self, round_id: u64) -> GameResult<TxReceipt> {
        let mut state = self.state.lock().expect("store state poisoned");
        let round = state
            .rounds
            .get_mut(&round_id)
            .ok_or(GameError::RoundNotFound(round_id))?;

        if round.settled {
            return Err(GameError::RoundAlreadySettled);
        }
        if round.cash_out_multiplier > 0 {
            return Err(GameError::AlreadyCashedOut);
        }
        if round.crash_multiplier == 0 {
            return Err(GameError::NotRevealed(round_id));
        }

        round.settled = true;
        round.won = false;
        let bet_amount = round.bet_amount;
        state.stats.total_losses += bet_amount;
        drop(state);

        Ok(self.receipt(
            "settle_loss",
            vec![RoundEvent::RoundSettled {
                round_id,
                won: false,
                payout: 0,
            }],
        ))
    }

    async fn get_round(&self, round_id: u64) -> GameResult<Round> {
        let state = self.state.lock().expect("store state poisoned");
        state
            .rounds
            .get(&round_id)
            .cloned()
            .ok_or(GameError::RoundNotFound(round_id))
    }

    async fn get_player_rounds(&self, player: Address) -> GameResult<Vec<u64>> {
        let state = self.state.lock().expect("store state poisoned");
        Ok(state.player_rounds.get(&player).cloned().unwrap_or_default())
    }

    async fn get_stats(&self) -> GameResult<GameStats> {
        let state = self.state.lock().expect("store state poisoned");
        Ok(state.stats.clone())
    }

    async fn current_round_id(&self) -> GameResult<u64> {
        let state = self.state.lock().expect("store state poisoned");
        Ok(state.stats.current_round_id)
    }

    async fn min_bet(&self) -> GameResult<u128> {
        Ok(self.params.min_bet)
    }

    async fn max_bet(&self) -> GameResult<u128> {
        Ok(self.params.max_bet)
    }

    async fn house_edge(&self) -> GameResult<u32> {
        Ok(self.params.house_edge_bps)
    }

    fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.events.subscribe()
    }
}

/// In-memory fungible-token ledger with standard allowance semantics.
pub struct MemoryTokenLedger {
    balances: DashMap<Address, u128>,
    allowances: DashMap<(Address, Address), u128>,
}

impl MemoryTokenLedger {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            allowances: DashMap::new(),
        }
    }

    /// Credits an account directly, for tests and simulation setup.
    pub fn mint(&self, owner: Address, amount: u128) {
        *self.balances.entry(owner).or_insert(0) += amount;
    }
}

impl Default for MemoryTokenLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenLedger for MemoryTokenLedger {
    async fn balance_of(&self, owner: Address) -> GameResult<u128> {
        Ok(self.balances.get(&owner).map(|b| *b).unwrap_or(0))
    }

    async fn allowance(&self, owner: Address, spender: Address) -> GameResult<u128> {
        Ok(self
            .allowances
            .get(&(owner, spender))
            .map(|a| *a)
            .unwrap_or(0))
    }

    async fn approve(&self, owner: Address, spender: Address, amount: u128) -> GameResult<()> {
        self.allowances.insert((owner, spender), amount);
        Ok(())
    }

    async fn transfer_from(
        &self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: u128,
    ) -> GameResult<()> {
        if amount == 0 {
            return Ok(());
        }

        // Self-transfers by the owner bypass the allowance, matching the
        // house paying out of its own bankroll.
        if spender != owner {
            let mut allowance = self
                .allowances
                .entry((owner, spender))
                .or_insert(0);
            if *allowance < amount {
                return Err(GameError::InsufficientAllowance {
                    needed: amount,
                    granted: *allowance,
                });
            }
            *allowance -= amount;
        }

        {
            let mut from_balance = self.balances.entry(owner).or_insert(0);
            if *from_balance < amount {
                return Err(GameError::InsufficientBalance {
                    needed: amount,
                    available: *from_balance,
                });
            }
            *from_balance -= amount;
        }
        *self.balances.entry(to).or_insert(0) += amount;
        Ok(())
    }
}
