//! Clock adapters.
//!
//! - [`SystemClock`] reads the host wall clock, truncated to whole
//!   microseconds so a timestamp survives a store round-trip unchanged.
//! - [`ManualClock`] is set and advanced by hand; clones share one instant,
//!   so a test can hold one handle while a component owns another.

use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};

use crate::app::ports::Clock;

/// Host wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.now.set(at);
    }

    pub fn advance(&self, by: TimeDelta) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}
