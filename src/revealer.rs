//! Auto-revealer service.
//!
//! The one piece of liveness in the whole game: bets only ever resolve
//! because this worker reveals their crash points and settles rounds
//! nobody cashed out. It listens for bet-placed events, waits a randomized
//! game-duration delay, reveals, then after a grace period settles the
//! round as a loss if the player never claimed.
//!
//! Restart safety comes from the startup sweep: any round left with a bet,
//! no crash point, and no settlement by a previous process is revealed
//! immediately. A per-round failure is logged and the round returned to an
//! unprocessed state for the next sweep; it never takes the service down.

use crate::errors::{GameError, GameResult};
use crate::fairness;
use crate::round::RoundEvent;
use crate::store::RoundStore;
use dashmap::{DashMap, DashSet};
use rand::Rng;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::{fs, io};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct RevealerConfig {
    /// How many trailing rounds the startup/periodic sweep inspects.
    pub scan_window: u64,
    /// Bounds of the randomized simulated game duration between a bet
    /// landing and its reveal.
    pub min_reveal_delay: Duration,
    pub max_reveal_delay: Duration,
    /// How long after the reveal the player keeps the right to cash out
    /// before the round is settled as a loss.
    pub grace_period: Duration,
    /// Interval of the periodic sweep that retries failed rounds.
    pub rescan_interval: Duration,
}

impl Default for RevealerConfig {
    fn default() -> Self {
        Self {
            scan_window: 10,
            min_reveal_delay: Duration::from_secs(3),
            max_reveal_delay: Duration::from_secs(10),
            grace_period: Duration::from_secs(5),
            rescan_interval: Duration::from_secs(15),
        }
    }
}

impl RevealerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_reveal_delay > self.max_reveal_delay {
            return Err("min_reveal_delay exceeds max_reveal_delay".to_string());
        }
        if self.rescan_interval.is_zero() {
            return Err("rescan_interval must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Holds server seeds the operator has committed to but not yet revealed,
/// keyed by their published commitment hash.
///
/// A round placed with a commitment can only be revealed with the seed
/// that hashes to it, so losing the seed strands the round forever. A
/// vault opened with [`SeedVault::open`] writes through to a TOML file so
/// the seeds survive a process restart and the startup sweep can still
/// reveal committed rounds.
#[derive(Default)]
pub struct SeedVault {
    seeds: DashMap<[u8; 32], u64>,
    path: Option<PathBuf>,
}

impl SeedVault {
    /// In-memory vault. Committed rounds die with the process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a file-backed vault, loading any seeds a previous process
    /// left behind. A missing file starts the vault empty.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let seeds = DashMap::new();
        match fs::read_to_string(&path) {
            Ok(text) => {
                let entries: BTreeMap<String, String> = toml::from_str(&text)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                for (commitment_hex, seed_hex) in entries {
                    let bytes = hex::decode(&commitment_hex)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    let commitment: [u8; 32] = bytes.try_into().map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "commitment is not 32 bytes")
                    })?;
                    let seed = u64::from_str_radix(&seed_hex, 16)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    seeds.insert(commitment, seed);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(Self {
            seeds,
            path: Some(path),
        })
    }

    /// Generates a fresh seed and returns its commitment for publication.
    pub fn commit(&self) -> [u8; 32] {
        let seed: u64 = rand::thread_rng().gen();
        let commitment = fairness::commit_server_seed(seed);
        self.seeds.insert(commitment, seed);
        self.flush();
        commitment
    }

    /// Looks up the seed behind a commitment. Retained until the reveal
    /// confirms, so a failed submission can retry with the same seed.
    pub fn get(&self, commitment: &[u8; 32]) -> Option<u64> {
        self.seeds.get(commitment).map(|s| *s)
    }

    pub fn discard(&self, commitment: &[u8; 32]) {
        self.seeds.remove(commitment);
        self.flush();
    }

    // Whole-file rewrite on every change; the vault only ever holds the
    // handful of rounds currently in flight. Seeds go out as hex since
    // TOML integers cap at i64.
    fn flush(&self) {
        let Some(path) = &self.path else { return };
        let mut entries = BTreeMap::new();
        for entry in self.seeds.iter() {
            entries.insert(hex::encode(entry.key()), format!("{:016x}", entry.value()));
        }
        let text = match toml::to_string(&entries) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "seed vault serialization failed");
                return;
            }
        };
        if let Err(e) = fs::write(path, text) {
            warn!(path = %path.display(), error = %e, "seed vault write failed");
        }
    }
}

pub struct AutoRevealer {
    store: Arc<dyn RoundStore>,
    config: RevealerConfig,
    vault: Arc<SeedVault>,
    /// Rounds this process has scheduled or completed. Added when a round
    /// is picked up, removed on failure so a later sweep retries it,
    /// retained on success.
    processed: Arc<DashSet<u64>>,
    running: Arc<AtomicBool>,
}

impl AutoRevealer {
    pub fn new(store: Arc<dyn RoundStore>, config: RevealerConfig) -> Arc<Self> {
        Self::with_vault(store, config, Arc::new(SeedVault::new()))
    }

    pub fn with_vault(
        store: Arc<dyn RoundStore>,
        config: RevealerConfig,
        vault: Arc<SeedVault>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            vault,
            processed: Arc::new(DashSet::new()),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn vault(&self) -> Arc<SeedVault> {
        self.vault.clone()
    }

    /// Starts the event loop. Returns the handle of the main task; the
    /// per-round work runs in its own spawned tasks.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let revealer = self.clone();
        tokio::spawn(async move {
            info!("auto-revealer started");

            // Recovery sweep first: rounds stranded by a previous crash or
            // restart must not wait for fresh traffic.
            revealer.sweep_pending().await;

            let mut events = revealer.store.subscribe();
            let mut rescan = tokio::time::interval(revealer.config.rescan_interval);
            rescan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            rescan.reset();

            while revealer.running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = rescan.tick() => {
                        revealer.sweep_pending().await;
                    }
                    recv = events.recv() => {
                        match recv {
                            Ok(RoundEvent::BetPlaced { round_id, .. }) => {
                                let delay = revealer.random_reveal_delay();
                                debug!(round_id, ?delay, "bet placed, reveal scheduled");
                                revealer.schedule_round(round_id, delay);
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                // The sweep covers whatever we missed.
                                warn!(skipped, "event stream lagged, relying on sweep");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }

            info!("auto-revealer stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn random_reveal_delay(&self) -> Duration {
        let min = self.config.min_reveal_delay.as_millis() as u64;
        let max = self.config.max_reveal_delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Scans the trailing window for rounds that still need work: either
    /// unrevealed (crashed revealer, missed event) or revealed but never
    /// settled (settle submission failed last time).
    async fn sweep_pending(self: &Arc<Self>) {
        let current = match self.store.current_round_id().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "sweep: could not read current round id");
                return;
            }
        };

        let start = current.saturating_sub(self.config.scan_window);
        for round_id in start..current {
            if self.processed.contains(&round_id) {
                continue;
            }
            match self.store.get_round(round_id).await {
                Ok(round) if round.open() => {
                    info!(round_id, revealed = round.revealed(), "sweep picked up pending round");
                    self.schedule_round(round_id, Duration::ZERO);
                }
                Ok(_) => {}
                Err(GameError::RoundNotFound(_)) => {}
                Err(e) => warn!(round_id, error = %e, "sweep: round read failed"),
            }
        }
    }

    fn schedule_round(self: &Arc<Self>, round_id: u64, delay: Duration) {
        // First scheduler wins; the event path and the sweep can both see
        // the same round.
        if !self.processed.insert(round_id) {
            return;
        }

        let revealer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = revealer.resolve_round(round_id).await {
                // Return the round to an unprocessed state so the next
                // sweep retries it. Never drop a round silently.
                error!(round_id, error = %e, "round resolution failed, will retry");
                revealer.processed.remove(&round_id);
            }
        });
    }

    /// Drives one round to settlement: reveal if needed, wait out the
    /// grace period, then settle as a loss unless the player cashed out.
    async fn resolve_round(&self, round_id: u64) -> GameResult<()> {
        let round = self.store.get_round(round_id).await?;
        if round.settled {
            return Ok(());
        }

        if !round.revealed() {
            let server_seed = match round.server_seed_hash {
                Some(commitment) => self.vault.get(&commitment).ok_or_else(|| {
                    GameError::Unknown(format!(
                        "no seed in vault for commitment {}",
                        hex::encode(commitment)
                    ))
                })?,
                None => rand::thread_rng().gen(),
            };

            match self.store.reveal_crash(round_id, server_seed).await {
                Ok(_) => {
                    info!(round_id, "crash revealed");
                    if let Some(commitment) = round.server_seed_hash {
                        self.vault.discard(&commitment);
                    }
                }
                // Settled concurrently; nothing left to do here.
                Err(GameError::RoundAlreadySettled) => return Ok(()),
                Err(e) => return Err(e),
            }
        }

        tokio::time::sleep(self.config.grace_period).await;

        let round = self.store.get_round(round_id).await?;
        if round.settled || round.cash_out_multiplier > 0 {
            return Ok(());
        }

        match self.store.settle_loss(round_id).await {
            Ok(_) => {
                info!(round_id, "round settled as loss");
                Ok(())
            }
            // Losing the settle race to the player's cash-out is the
            // happy path for them, not a failure for us.
            Err(e) if e.is_race_loss() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
