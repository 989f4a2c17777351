//! Time sources for the cooperative scheduling loop.
//!
//! Engine code never reads the wall clock directly. A driver calls
//! `Sequencer::tick` and then `TimeSource::yield_until` to wait for the next
//! iteration: the system clock sleeps, the manual clock simply jumps, which
//! makes event timing exactly reproducible in tests.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait TimeSource {
    /// Milliseconds since this source's origin; monotonic.
    fn now(&self) -> f64;

    fn elapsed_ms(&self, since: f64) -> f64 {
        self.now() - since
    }

    /// Hands control back until `deadline` (in `now()` units) or later.
    fn yield_until(&self, deadline: f64);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn yield_until(&self, deadline: f64) {
        let wait = deadline - self.now();
        if wait > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(wait / 1000.0));
        }
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: f64) {
        if ms > 0.0 {
            self.now.set(self.now.get() + ms);
        }
    }

    /// Moves to `ms`; never backwards.
    pub fn set(&self, ms: f64) {
        if ms > self.now.get() {
            self.now.set(ms);
        }
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn yield_until(&self, deadline: f64) {
        self.set(deadline);
    }
}
