//! Time sources for the scheduler.
//!
//! Wake times are computed from the scheduler's own monotonic clock, read
//! once at the start of each pump. [`ManualClock`] lets tests drive that
//! clock deterministically instead of sleeping.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// The process monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    epoch: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            epoch: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::from_secs(0))),
        }
    }

    pub fn advance(&self, delta: Duration) {
        *self.offset.lock() += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.epoch + *self.offset.lock()
    }
}
