//! Engine clock: the single source of "now" for pruning, alert and
//! order-event timestamps, and the recent-activity summary window.
//!
//! Transaction timestamps are supplied by the caller and never read
//! from here.

use crate::types::Timestamp;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock. Used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used in tests and replay.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { current: Mutex::new(start) }
    }

    pub fn set(&self, at: Timestamp) {
        *self.current.lock() = at;
    }

    /// Move the clock forward. Returns the new time.
    pub fn advance(&self, by: Duration) -> Timestamp {
        let mut current = self.current.lock();
        *current += by;
        *current
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock()
    }
}
