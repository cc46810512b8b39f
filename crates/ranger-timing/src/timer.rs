//! One-shot timer scheduling.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use spin_sleep::SpinSleeper;
use tracing::{debug, info};

use crate::error::TimingError;

/// Work run when a one-shot timer expires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules one-shot callbacks, invoked asynchronously to the caller.
pub trait TimerService: Send + Sync {
    /// Runs `callback` once, `delay` from now.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<(), TimingError>;
}

/// Below this much remaining time the worker stops blocking and spins.
const SPIN_MARGIN: Duration = Duration::from_millis(2);

/// Assumed accuracy of the OS sleep (ns) handed to [`SpinSleeper`].
const NATIVE_ACCURACY_NS: u32 = 100_000;

struct Expiry {
    deadline: Instant,
    seq: u64,
    callback: TimerCallback,
}

impl PartialEq for Expiry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Expiry {}

impl PartialOrd for Expiry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the heap pops the earliest deadline first.
impl Ord for Expiry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    pending: BinaryHeap<Expiry>,
    next_seq: u64,
    shut_down: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

/// Timer service backed by a dedicated worker thread.
///
/// The worker blocks on a condition variable until shortly before the next
/// deadline and spin-sleeps the rest, which keeps sub-millisecond delays
/// accurate. Callbacks run on the worker thread, one at a time, and may
/// schedule further callbacks.
pub struct SpinTimer {
    shared: Arc<Shared>,
}

impl SpinTimer {
    pub fn new() -> Result<Self, TimingError> {
        Self::with_accuracy(SpinSleeper::new(NATIVE_ACCURACY_NS))
    }

    pub fn with_accuracy(sleeper: SpinSleeper) -> Result<Self, TimingError> {
        let shared = Arc::new(Shared::default());
        std::thread::Builder::new()
            .name("pulse-timer".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || run_worker(shared, sleeper)
            })
            .map_err(|_| TimingError::TimerArm("could not spawn timer thread"))?;
        Ok(SpinTimer { shared })
    }

    /// Stops the worker. Pending callbacks are dropped without running and
    /// later `schedule` calls fail.
    pub fn shutdown(&self) {
        let dropped = {
            let mut queue = self.shared.queue.lock();
            queue.shut_down = true;
            self.shared.wakeup.notify_all();
            std::mem::take(&mut queue.pending)
        };
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "Pending timer callbacks discarded.");
        }
        // Callbacks may own handles to this timer; drop them unlocked.
        drop(dropped);
    }
}

impl TimerService for SpinTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<(), TimingError> {
        let mut queue = self.shared.queue.lock();
        if queue.shut_down {
            return Err(TimingError::TimerArm("timer has been shut down"));
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.pending.push(Expiry {
            deadline: Instant::now() + delay,
            seq,
            callback,
        });
        self.shared.wakeup.notify_one();
        Ok(())
    }
}

impl Drop for SpinTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: Arc<Shared>, sleeper: SpinSleeper) {
    debug!("Timer thread started.");
    let mut queue = shared.queue.lock();
    loop {
        if queue.shut_down {
            break;
        }
        let Some(deadline) = queue.pending.peek().map(|e| e.deadline) else {
            shared.wakeup.wait(&mut queue);
            continue;
        };

        let now = Instant::now();
        if now >= deadline {
            if let Some(expiry) = queue.pending.pop() {
                MutexGuard::unlocked(&mut queue, expiry.callback);
            }
        } else if deadline - now > SPIN_MARGIN {
            shared.wakeup.wait_until(&mut queue, deadline - SPIN_MARGIN);
        } else {
            MutexGuard::unlocked(&mut queue, || sleeper.sleep(deadline - now));
        }
    }
    info!("Timer thread stopped.");
}
