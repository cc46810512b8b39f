use std::time::Instant;

use ranger_distance::Timestamp;

/// Free-running monotonic clock used for echo edge timestamps.
pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Monotonic clock backed by [`Instant`], counting from its construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now(&self) -> Timestamp {
        let nanos = self.origin.elapsed().as_nanos();
        Timestamp::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
