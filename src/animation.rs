//! Local multiplier animation driver.
//!
//! Purely cosmetic: gives the player a live number to react to before the
//! authoritative crash point is confirmed. The value shown here is a
//! function of wall-clock time only and is never a source of truth; a
//! cash-out submitted from it can still come back `TooLateCrashed` if the
//! real crash point, revealed concurrently, was lower.

use std::time::{Duration, Instant};

/// Display state of the ticker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickerState {
    Idle,
    Running,
    /// Terminal for the round; the displayed value is pinned to the crash
    /// point and stops advancing.
    Crashed,
}

/// Timer-driven multiplier estimate, scaled by 100 like every multiplier
/// on the wire. Growth is linear: 1.00x plus one full multiplier unit per
/// `growth_period`.
#[derive(Debug)]
pub struct MultiplierTicker {
    growth_period: Duration,
    start: Option<Instant>,
    /// Locally known crash point, once the reveal has been observed.
    crash_multiplier: Option<u32>,
    state: TickerState,
}

impl MultiplierTicker {
    pub fn new(growth_period: Duration) -> Self {
        Self {
            growth_period,
            start: None,
            crash_multiplier: None,
            state: TickerState::Idle,
        }
    }

    /// Starts the round timer. Called once per round, at bet confirmation;
    /// calling again resets for a new round.
    pub fn start(&mut self, now: Instant) {
        self.start = Some(now);
        self.crash_multiplier = None;
        self.state = TickerState::Running;
    }

    /// Records the authoritative crash point once revealed. The ticker
    /// transitions to `Crashed` as soon as its local value reaches it.
    pub fn observe_crash(&mut self, crash_multiplier: u32) {
        self.crash_multiplier = Some(crash_multiplier);
    }

    pub fn state(&self) -> TickerState {
        self.state
    }

    /// Current display value at `now`, scaled by 100. Advances the state
    /// machine; once crashed the value is frozen at the crash point.
    pub fn value_at(&mut self, now: Instant) -> u32 {
        let Some(start) = self.start else {
            return 100;
        };
        if self.state == TickerState::Crashed {
            // Pinned; observe_crash has always been called by now.
            return self.crash_multiplier.unwrap_or(100);
        }

        let elapsed = now.saturating_duration_since(start);
        let value = 100
            + (elapsed.as_millis() as u64 * 100 / self.growth_period.as_millis().max(1) as u64)
                as u32;

        if let Some(crash) = self.crash_multiplier {
            if value >= crash {
                self.state = TickerState::Crashed;
                return crash;
            }
        }
        value
    }
}
