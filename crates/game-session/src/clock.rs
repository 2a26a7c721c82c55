//! Per-side countdown clocks with increment-on-move.
//!
//! The clock is pure state driven by explicit `Instant`s; the runner feeds it
//! from a tokio interval. Ticks subtract elapsed wall time from whichever
//! side is running, clamped at zero; the flag fires exactly once. Increment
//! is credited only through `apply_increment`, which must be called from the
//! move-application path and from nowhere else — turn observation must never
//! credit time, or a re-observed turn change double-pays the mover.

use std::time::{Duration, Instant};

use shakmaty::Color;

use crate::error::SessionError;

#[derive(Debug, Clone)]
pub struct GameClock {
    remaining: [Duration; 2],
    increment: [Duration; 2],
    running: Option<Color>,
    last_tick: Option<Instant>,
    flagged: Option<Color>,
    stopped: bool,
    started: bool,
}

fn idx(color: Color) -> usize {
    match color {
        Color::White => 0,
        Color::Black => 1,
    }
}

impl GameClock {
    /// Symmetric time control.
    pub fn new(initial: Duration, increment: Duration) -> Self {
        Self {
            remaining: [initial; 2],
            increment: [increment; 2],
            running: None,
            last_tick: None,
            flagged: None,
            stopped: false,
            started: false,
        }
    }

    pub fn remaining(&self, color: Color) -> Duration {
        self.remaining[idx(color)]
    }

    pub fn remaining_ms(&self, color: Color) -> u64 {
        self.remaining(color).as_millis() as u64
    }

    pub fn increment_ms(&self, color: Color) -> u64 {
        self.increment[idx(color)].as_millis() as u64
    }

    pub fn flagged(&self) -> Option<Color> {
        self.flagged
    }

    /// Begin (or continue) counting down for `color`. Settles the previous
    /// side's elapsed time first. The orchestrator calls this only after a
    /// move has been applied, so no time passes before the first move.
    pub fn run_for(&mut self, color: Color, now: Instant) {
        if self.stopped {
            return;
        }
        self.tick(now);
        self.running = Some(color);
        self.last_tick = Some(now);
        self.started = true;
    }

    /// Advance the running side's countdown. Returns the newly flagged side
    /// exactly once; afterwards the clock is stopped and further ticks are
    /// no-ops.
    pub fn tick(&mut self, now: Instant) -> Option<Color> {
        if self.stopped {
            return None;
        }
        let side = self.running?;
        let last = match self.last_tick {
            Some(t) => t,
            None => {
                self.last_tick = Some(now);
                return None;
            }
        };
        let elapsed = now.saturating_duration_since(last);
        self.last_tick = Some(now);

        let rem = &mut self.remaining[idx(side)];
        *rem = rem.saturating_sub(elapsed);
        if rem.is_zero() && self.flagged.is_none() {
            self.flagged = Some(side);
            self.stopped = true;
            return Some(side);
        }
        None
    }

    /// Credit `color`'s increment. One call per move that side makes.
    pub fn apply_increment(&mut self, color: Color) {
        if self.stopped {
            return;
        }
        self.remaining[idx(color)] += self.increment[idx(color)];
    }

    /// Halt permanently; the game result is final.
    pub fn stop(&mut self) {
        self.running = None;
        self.stopped = true;
    }

    /// Replace the time control. A configuration operation: once the clock
    /// has run in this game, the change is rejected.
    pub fn set_time_control(
        &mut self,
        initial: Duration,
        increment: Duration,
    ) -> Result<(), SessionError> {
        if self.started {
            return Err(SessionError::TimeControlLocked);
        }
        self.remaining = [initial; 2];
        self.increment = [increment; 2];
        Ok(())
    }
}
