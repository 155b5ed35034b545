//! Session stopwatch with a hard timeout.
//!
//! One instance is owned by the session controller and lent to whichever
//! session is active. The timer never sleeps on its own: the front end calls
//! [`SessionTimer::tick`] once per [`TICK_PERIOD`] on the same thread that
//! performs every other transition.

use std::time::Duration;

/// Period between ticks.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Safety cutoff for any single recording or playback, in ticks.
pub const MAX_TICKS: u64 = 3600;

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The timer is not running; nothing changed.
    Idle,
    /// One more second elapsed.
    Tick { elapsed: u64 },
    /// The maximum duration was reached. The timer has stopped itself.
    Expired { elapsed: u64 },
}

#[derive(Debug, Clone)]
pub struct SessionTimer {
    max_ticks: u64,
    running: bool,
    elapsed: u64,
}

impl Default for SessionTimer {
    fn default() -> Self {
        Self::new(MAX_TICKS)
    }
}

impl SessionTimer {
    pub fn new(max_ticks: u64) -> Self {
        Self {
            max_ticks,
            running: false,
            elapsed: 0,
        }
    }

    /// Start counting from zero. Starting a running timer restarts it.
    pub fn start(&mut self) {
        if self.running {
            self.cancel();
        }
        self.elapsed = 0;
        self.running = true;
    }

    /// Stop counting without firing the timeout. The counter keeps its value.
    pub fn cancel(&mut self) {
        self.running = false;
    }

    /// Reset the elapsed counter to zero.
    pub fn reset(&mut self) {
        self.elapsed = 0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn tick(&mut self) -> TimerEvent {
        if !self.running {
            return TimerEvent::Idle;
        }
        self.elapsed += 1;
        if self.elapsed >= self.max_ticks {
            self.running = false;
            TimerEvent::Expired {
                elapsed: self.elapsed,
            }
        } else {
            TimerEvent::Tick {
                elapsed: self.elapsed,
            }
        }
    }
}
