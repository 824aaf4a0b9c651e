//! Crash revealer service binary.
//!
//! Long-running operator process that reveals crash points for placed bets
//! and settles rounds nobody cashed out. Runs against the in-memory round
//! store in simulation mode; a chain-backed store implementation plugs in
//! behind the same `RoundStore` trait for a live deployment.

use clap::Parser;
use crashpoint::animation::{MultiplierTicker, TickerState};
use crashpoint::config::EngineConfig;
use crashpoint::controller::GameController;
use crashpoint::errors::GameError;
use crashpoint::memory::{MemoryRoundStore, MemoryTokenLedger, StoreParams};
use crashpoint::revealer::{AutoRevealer, RevealerConfig, SeedVault};
use crashpoint::round::Address;
use crashpoint::store::RoundStore;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

#[derive(Parser, Debug)]
#[command(name = "crash-revealer")]
#[command(about = "Auto-revealer service for the crash game", long_about = None)]
struct Args {
    /// Path to a TOML config file; flags below override it.
    #[arg(long)]
    config: Option<String>,

    /// Rounds inspected by the recovery sweep
    #[arg(long)]
    scan_window: Option<u64>,

    /// Minimum simulated game duration before reveal (ms)
    #[arg(long)]
    min_reveal_delay_ms: Option<u64>,

    /// Maximum simulated game duration before reveal (ms)
    #[arg(long)]
    max_reveal_delay_ms: Option<u64>,

    /// Cash-out grace period after reveal (ms)
    #[arg(long)]
    grace_period_ms: Option<u64>,

    /// File persisting committed server seeds across restarts
    #[arg(long)]
    seed_vault: Option<String>,

    /// Number of simulated players driving bets through the engine
    #[arg(long, default_value = "2")]
    players: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(v) = args.scan_window {
        config.revealer.scan_window = v;
    }
    if let Some(v) = args.min_reveal_delay_ms {
        config.revealer.min_reveal_delay_ms = v;
    }
    if let Some(v) = args.max_reveal_delay_ms {
        config.revealer.max_reveal_delay_ms = v;
    }
    if let Some(v) = args.grace_period_ms {
        config.revealer.grace_period_ms = v;
    }
    if let Some(v) = args.seed_vault {
        config.revealer.seed_vault_path = Some(v);
    }
    config.validate()?;

    let revealer_config = RevealerConfig::from(&config.revealer);

    // Local simulation backend: in-memory store, funded house, simulated
    // players exercising the full bet -> reveal -> settle loop.
    let ledger = Arc::new(MemoryTokenLedger::new());
    let params = StoreParams::default();
    let house = params.house;
    ledger.mint(house, 10_000_000 * ONE_TOKEN);
    let store = Arc::new(MemoryRoundStore::new(params, ledger.clone()));

    let vault = match &config.revealer.seed_vault_path {
        Some(path) => Arc::new(SeedVault::open(path)?),
        None => Arc::new(SeedVault::new()),
    };
    let revealer = AutoRevealer::with_vault(store.clone(), revealer_config, vault);
    let handle = revealer.spawn();
    info!(players = args.players, "crash revealer running (simulation backend)");

    for i in 0..args.players {
        let mut addr = [0u8; 20];
        addr[19] = i as u8 + 1;
        let player = Address(addr);
        ledger.mint(player, 10_000 * ONE_TOKEN);

        let controller = GameController::new(
            store.clone(),
            ledger.clone(),
            player,
            house,
            config.controller.confirmation_timeout(),
        );
        let vault = revealer.vault();
        let growth_period = Duration::from_millis(config.animation.growth_period_ms);
        tokio::spawn(async move {
            play_forever(controller, vault, growth_period).await;
        });
    }

    let stats_store = store.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(10));
        loop {
            tick.tick().await;
            if let Ok(stats) = stats_store.get_stats().await {
                info!(
                    rounds = stats.current_round_id,
                    total_bets = stats.total_bets / ONE_TOKEN,
                    total_winnings = stats.total_winnings / ONE_TOKEN,
                    total_losses = stats.total_losses / ONE_TOKEN,
                    "house totals"
                );
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    revealer.stop();
    handle.abort();
    Ok(())
}

/// Simulated player: bets, watches the local ticker, tries to cash out at
/// a random target multiplier, and takes the crash on the chin when too
/// slow. Exercises every path the real client takes.
async fn play_forever(
    controller: GameController,
    vault: Arc<SeedVault>,
    growth_period: Duration,
) {
    let mut ticker = MultiplierTicker::new(growth_period);
    loop {
        let amount = rand::thread_rng().gen_range(1..=50) as u128 * ONE_TOKEN;
        let client_seed: u64 = rand::thread_rng().gen();
        let commitment = vault.commit();

        let ticket = match controller
            .place_bet_with_commitment(amount, client_seed, Some(commitment))
            .await
        {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(player = %controller.player(), error = %e, "bet failed");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        ticker.start(Instant::now());
        let target: u32 = rand::thread_rng().gen_range(110..=500);

        loop {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let value = ticker.value_at(Instant::now());

            if let Ok(round) = controller.reconcile(ticket.round_id).await {
                if round.settled {
                    info!(
                        player = %controller.player(),
                        round_id = ticket.round_id,
                        won = round.won,
                        "round resolved"
                    );
                    break;
                }
                if round.revealed() {
                    ticker.observe_crash(round.crash_multiplier);
                }
            }

            if ticker.state() == TickerState::Crashed {
                continue; // Settlement is on its way.
            }

            if value >= target {
                match controller.cash_out(ticket.round_id, value).await {
                    Ok(cash) => {
                        info!(
                            player = %controller.player(),
                            round_id = ticket.round_id,
                            winnings = cash.winnings / ONE_TOKEN,
                            "cashed out"
                        );
                        break;
                    }
                    Err(GameError::NotRevealed(_)) => {
                        // Crash point not disclosed yet; keep watching.
                    }
                    Err(e) if e.is_race_loss() => {
                        info!(player = %controller.player(), round_id = ticket.round_id, "too slow: {e}");
                        break;
                    }
                    Err(e) => {
                        warn!(player = %controller.player(), error = %e, "cash-out failed");
                        break;
                    }
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}
