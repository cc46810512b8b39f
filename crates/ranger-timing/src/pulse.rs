//! Self-retriggering trigger pulse train.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::TimingError;
use crate::port::DigitalPort;
use crate::timer::TimerService;

/// Level the pulse generator last drove onto the trigger line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Asserted,
    Deasserted,
}

impl TriggerState {
    fn from_level(asserted: bool) -> Self {
        if asserted {
            TriggerState::Asserted
        } else {
            TriggerState::Deasserted
        }
    }
}

/// How long the trigger line stays in each state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTiming {
    /// Trigger pulse width required by the sensor.
    pub asserted: Duration,
    /// Rest period between trigger pulses.
    pub deasserted: Duration,
}

impl PulseTiming {
    pub fn hold_time(&self, state: TriggerState) -> Duration {
        match state {
            TriggerState::Asserted => self.asserted,
            TriggerState::Deasserted => self.deasserted,
        }
    }

    pub fn period(&self) -> Duration {
        self.asserted + self.deasserted
    }
}

impl Default for PulseTiming {
    fn default() -> Self {
        PulseTiming {
            asserted: Duration::from_millis(1),
            deasserted: Duration::from_millis(99),
        }
    }
}

struct PulseShared {
    /// `true` while the trigger is asserted.
    asserted: AtomicBool,
    started: AtomicBool,
    stopped: AtomicBool,
    rearms: AtomicU64,
    /// Held across the stopped check and the line write.
    line: Mutex<()>,
    fault: Mutex<Option<TimingError>>,
    timing: PulseTiming,
    port: Arc<dyn DigitalPort>,
    timer: Arc<dyn TimerService>,
}

/// Two-state oscillator on the trigger line.
///
/// Every timer expiry toggles [`TriggerState`], drives the trigger line to
/// match and re-arms the timer for the hold time of the new state. The cycle
/// has no terminal state; it runs until [`PulseGenerator::stop`] or until a
/// re-arm is refused, in which case the error is latched in
/// [`PulseGenerator::fault`].
///
/// Clones share the same pulse train. Pending ticks only hold a weak
/// reference, so dropping the last clone also ends the train and releases
/// the timer.
#[derive(Clone)]
pub struct PulseGenerator {
    shared: Arc<PulseShared>,
}

impl PulseGenerator {
    pub fn new(port: Arc<dyn DigitalPort>, timer: Arc<dyn TimerService>, timing: PulseTiming) -> Self {
        PulseGenerator {
            shared: Arc::new(PulseShared {
                asserted: AtomicBool::new(false),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                rearms: AtomicU64::new(0),
                line: Mutex::new(()),
                fault: Mutex::new(None),
                timing,
                port,
                timer,
            }),
        }
    }

    /// Drives the trigger line low and arms the first tick.
    ///
    /// Returns as soon as the tick is armed. Calling `start` on a running
    /// generator does nothing.
    ///
    /// # Errors
    ///
    /// Returns `Err(TimingError::TimerArm)` if the timer refuses the first tick;
    /// no trigger pulses will be produced.
    pub fn start(&self) -> Result<(), TimingError> {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            debug!("Pulse generator already started.");
            return Ok(());
        }
        self.shared.port.write_trigger_line(false);
        let delay = self.shared.timing.deasserted;
        if let Err(e) = arm(&self.shared, delay) {
            self.shared.started.store(false, Ordering::Release);
            return Err(e);
        }
        info!(
            width = ?self.shared.timing.asserted,
            period = ?self.shared.timing.period(),
            "Pulse generator started."
        );
        Ok(())
    }

    /// Lets the pending tick expire without re-arming. The trigger line is left low.
    ///
    /// Waits for an expiry that is driving the line to finish first.
    pub fn stop(&self) {
        let _line = self.shared.line.lock();
        if !self.shared.stopped.swap(true, Ordering::AcqRel) {
            self.shared.port.write_trigger_line(false);
            info!(rearms = self.rearm_count(), "Pulse generator stopped.");
        }
    }

    pub fn state(&self) -> TriggerState {
        TriggerState::from_level(self.shared.asserted.load(Ordering::Acquire))
    }

    /// Number of timer expiries handled so far.
    pub fn rearm_count(&self) -> u64 {
        self.shared.rearms.load(Ordering::Acquire)
    }

    /// The re-arm failure that ended the pulse train, if any.
    pub fn fault(&self) -> Option<TimingError> {
        self.shared.fault.lock().clone()
    }
}

fn arm(shared: &Arc<PulseShared>, delay: Duration) -> Result<(), TimingError> {
    let next: Weak<PulseShared> = Arc::downgrade(shared);
    shared.timer.schedule(
        delay,
        Box::new(move || {
            if let Some(shared) = next.upgrade() {
                on_expiry(shared);
            }
        }),
    )
}

fn on_expiry(shared: Arc<PulseShared>) {
    let asserted = {
        let _line = shared.line.lock();
        if shared.stopped.load(Ordering::Acquire) {
            return;
        }
        let asserted = !shared.asserted.fetch_xor(true, Ordering::AcqRel);
        shared.port.write_trigger_line(asserted);
        asserted
    };
    shared.rearms.fetch_add(1, Ordering::AcqRel);

    let delay = shared.timing.hold_time(TriggerState::from_level(asserted));
    if let Err(e) = arm(&shared, delay) {
        error!(error = %e, "Trigger pulse train stopped: re-arm refused.");
        *shared.fault.lock() = Some(e);
    }
}
