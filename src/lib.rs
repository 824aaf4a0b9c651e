//! Crashpoint - provably-fair crash game round lifecycle engine.
//!
//! Players stake tokens, a multiplier climbs, and whoever cashes out
//! before the pseudo-random crash point wins proportionally. This crate is
//! the round lifecycle core behind that game: commit-reveal crash-point
//! derivation, the round state machine from bet to settlement, the
//! lifecycle controller the client drives, and the always-on auto-revealer
//! that guarantees every round eventually resolves.
//!
//! The authoritative ledger is behind the [`store::RoundStore`] trait; the
//! in-memory implementation in [`memory`] carries the full contract
//! semantics for tests and local simulation, and a chain-backed
//! implementation slots in behind the same trait.

pub mod animation;
pub mod config;
pub mod controller;
pub mod errors;
pub mod fairness;
pub mod memory;
pub mod revealer;
pub mod round;
pub mod store;

pub use controller::GameController;
pub use errors::{GameError, GameResult};
pub use fairness::derive_crash_point;
pub use revealer::AutoRevealer;
pub use round::{Address, Round, RoundEvent};
