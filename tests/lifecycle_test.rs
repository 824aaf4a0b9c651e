//! End-to-end lifecycle tests: controller, store, and auto-revealer wired
//! together the way the deployed system runs.

use async_trait::async_trait;
use crashpoint::controller::GameController;
use crashpoint::errors::{GameError, GameResult};
use crashpoint::memory::{MemoryRoundStore, MemoryTokenLedger, StoreParams};
use crashpoint::revealer::{AutoRevealer, RevealerConfig};
use crashpoint::round::{Address, GameStats, Round, RoundEvent};
use crashpoint::store::{RoundStore, TxReceipt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

struct Harness {
    store: Arc<MemoryRoundStore>,
    ledger: Arc<MemoryTokenLedger>,
    house: Address,
}

fn harness() -> Harness {
    let ledger = Arc::new(MemoryTokenLedger::new());
    let params = StoreParams::default();
    let house = params.house;
    ledger.mint(house, 1_000_000 * ONE_TOKEN);
    let store = Arc::new(MemoryRoundStore::new(params, ledger.clone()));
    Harness { store, ledger, house }
}

fn controller_for(h: &Harness, byte: u8) -> GameController {
    let player = Address([byte; 20]);
    h.ledger.mint(player, 1_000 * ONE_TOKEN);
    GameController::new(
        h.store.clone(),
        h.ledger.clone(),
        player,
        h.house,
        Duration::from_secs(5),
    )
}

fn fast_revealer_config() -> RevealerConfig {
    RevealerConfig {
        scan_window: 10,
        min_reveal_delay: Duration::from_millis(10),
        max_reveal_delay: Duration::from_millis(20),
        grace_period: Duration::from_millis(30),
        rescan_interval: Duration::from_millis(40),
    }
}

#[tokio::test]
async fn full_round_loss_without_cash_out() {
    let h = harness();
    let controller = controller_for(&h, 0xa1);
    let revealer = AutoRevealer::new(h.store.clone(), fast_revealer_config());
    revealer.spawn();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let ticket = controller.place_bet(100 * ONE_TOKEN, 12345).await.unwrap();

    // Player never cashes out; the revealer must resolve the round alone.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let round = controller.reconcile(ticket.round_id).await.unwrap();
    assert!(round.settled);
    assert!(!round.won);
    assert_eq!(round.cash_out_multiplier, 0);
    assert!(round.revealed());

    let stats = controller.stats().await.unwrap();
    assert_eq!(stats.total_losses, 100 * ONE_TOKEN);
    revealer.stop();
}

#[tokio::test]
async fn full_round_win_with_cash_out() {
    let h = harness();
    let controller = controller_for(&h, 0xa2);
    let config = RevealerConfig {
        grace_period: Duration::from_millis(300),
        ..fast_revealer_config()
    };
    let revealer = AutoRevealer::new(h.store.clone(), config);
    revealer.spawn();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let ticket = controller.place_bet(100 * ONE_TOKEN, 777).await.unwrap();

    // Wait out the reveal, then claim just under the crash point.
    let mut crash = 0;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let round = controller.reconcile(ticket.round_id).await.unwrap();
        if round.revealed() {
            crash = round.crash_multiplier;
            break;
        }
    }
    assert!(crash > 100, "round never revealed");

    let cash = controller.cash_out(ticket.round_id, crash - 1).await.unwrap();
    assert!(cash.winnings > 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let round = controller.reconcile(ticket.round_id).await.unwrap();
    assert!(round.settled);
    assert!(round.won);
    assert_eq!(round.cash_out_multiplier, crash - 1);
}

#[tokio::test]
async fn settled_round_is_immutable() {
    let h = harness();
    let controller = controller_for(&h, 0xa3);

    let ticket = controller.place_bet(10 * ONE_TOKEN, 1).await.unwrap();
    h.store.reveal_crash(ticket.round_id, 67890).await.unwrap();
    h.store.settle_loss(ticket.round_id).await.unwrap();

    let before = controller.reconcile(ticket.round_id).await.unwrap();
    assert!(h.store.settle_loss(ticket.round_id).await.is_err());
    assert!(h.store.cash_out(ticket.round_id, 150).await.is_err());
    let after = controller.reconcile(ticket.round_id).await.unwrap();

    assert_eq!(before.crash_multiplier, after.crash_multiplier);
    assert_eq!(before.cash_out_multiplier, after.cash_out_multiplier);
    assert_eq!(before.server_seed, after.server_seed);
    assert!(after.settled && !after.won);
}

/// Store wrapper whose `reveal_crash` fails a configurable number of times
/// with a transient transport error before letting calls through.
struct FlakyStore {
    inner: Arc<MemoryRoundStore>,
    reveal_failures_left: AtomicU32,
}

#[async_trait]
impl RoundStore for FlakyStore {
    async fn place_bet(
        &self,
        player: Address,
        amount: u128,
        client_seed: u64,
        server_seed_hash: Option<[u8; 32]>,
    ) -> GameResult<TxReceipt> {
        self.inner.place_bet(player, amount, client_seed, server_seed_hash).await
    }

    async fn reveal_crash(&self, round_id: u64, server_seed: u64) -> GameResult<TxReceipt> {
        if self
            .reveal_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GameError::ContractUnavailable("injected: connection reset".into()));
        }
        self.inner.reveal_crash(round_id, server_seed).await
    }

    async fn cash_out(&self, round_id: u64, multiplier: u32) -> GameResult<TxReceipt> {
        self.inner.cash_out(round_id, multiplier).await
    }

    async fn settle_loss(&self, round_id: u64) -> GameResult<TxReceipt> {
        self.inner.settle_loss(round_id).await
    }

    async fn get_round(&self, round_id: u64) -> GameResult<Round> {
        self.inner.get_round(round_id).await
    }

    async fn get_player_rounds(&self, player: Address) -> GameResult<Vec<u64>> {
        self.inner.get_player_rounds(player).await
    }

    async fn get_stats(&self) -> GameResult<GameStats> {
        self.inner.get_stats().await
    }

    async fn current_round_id(&self) -> GameResult<u64> {
        self.inner.current_round_id().await
    }

    async fn min_bet(&self) -> GameResult<u128> {
        self.inner.min_bet().await
    }

    async fn max_bet(&self) -> GameResult<u128> {
        self.inner.max_bet().await
    }

    async fn house_edge(&self) -> GameResult<u32> {
        self.inner.house_edge().await
    }

    fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.inner.subscribe()
    }
}

#[tokio::test]
async fn reveal_failure_is_retried_until_it_succeeds() {
    let h = harness();
    let controller = controller_for(&h, 0xa4);
    let flaky = Arc::new(FlakyStore {
        inner: h.store.clone(),
        reveal_failures_left: AtomicU32::new(2),
    });

    let revealer = AutoRevealer::new(flaky.clone(), fast_revealer_config());
    revealer.spawn();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let ticket = controller.place_bet(50 * ONE_TOKEN, 42).await.unwrap();

    // Two injected failures, then the periodic sweep must pick the round
    // back up and finish the job.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let round = controller.reconcile(ticket.round_id).await.unwrap();
    assert!(round.revealed(), "reveal was dropped after transient failures");
    assert!(round.settled);
    assert_eq!(flaky.reveal_failures_left.load(Ordering::SeqCst), 0);
    revealer.stop();
}

#[tokio::test]
async fn concurrent_players_settle_independently() {
    let h = harness();
    let revealer = AutoRevealer::new(h.store.clone(), fast_revealer_config());
    revealer.spawn();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut handles = Vec::new();
    for byte in 0xb0..0xb8u8 {
        let controller = controller_for(&h, byte);
        handles.push(tokio::spawn(async move {
            let ticket = controller.place_bet(10 * ONE_TOKEN, byte as u64).await.unwrap();
            ticket.round_id
        }));
    }

    let mut round_ids = Vec::new();
    for handle in handles {
        round_ids.push(handle.await.unwrap());
    }
    round_ids.sort_unstable();
    round_ids.dedup();
    assert_eq!(round_ids.len(), 8, "round ids must be unique across players");

    tokio::time::sleep(Duration::from_millis(300)).await;
    for round_id in round_ids {
        let round = h.store.get_round(round_id).await.unwrap();
        assert!(round.settled, "round {round_id} left unresolved");
    }
    revealer.stop();
}
