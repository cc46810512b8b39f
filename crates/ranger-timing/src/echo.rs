//! Edge-to-edge echo pulse timer.

use std::sync::Arc;
use std::time::Duration;

use ranger_distance::{EchoWindow, Timestamp};

use crate::clock::MonotonicClock;
use crate::error::{EchoEdge, EchoTimeout};
use crate::port::DigitalPort;

/// Busy-polls the echo line and timestamps both edges of one pulse.
///
/// The two waits are bounded separately. The arrival timeout limits the wait
/// for the rising edge, which spans the rest period between trigger pulses,
/// so it must exceed one [`PulseTiming::period`](crate::PulseTiming::period).
/// The pulse timeout limits how long the line may stay high. With neither
/// set, [`EchoTimer::measure_echo`] spins for as long as the line refuses to
/// toggle.
#[derive(Clone)]
pub struct EchoTimer {
    port: Arc<dyn DigitalPort>,
    clock: Arc<dyn MonotonicClock>,
    arrival_timeout: Option<Duration>,
    timeout: Option<Duration>,
}

impl EchoTimer {
    pub fn new(port: Arc<dyn DigitalPort>, clock: Arc<dyn MonotonicClock>) -> Self {
        EchoTimer {
            port,
            clock,
            arrival_timeout: None,
            timeout: None,
        }
    }

    /// Bounds the width of the echo pulse.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bounds the wait for the echo pulse to begin.
    pub fn with_arrival_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.arrival_timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn arrival_timeout(&self) -> Option<Duration> {
        self.arrival_timeout
    }

    /// Waits for the next complete echo pulse.
    ///
    /// Blocks the calling thread with a pure spin. If the line is already
    /// high on entry, the pulse is timed from the first poll.
    ///
    /// # Errors
    ///
    /// Returns `Err(EchoTimeout)` if the rising edge does not arrive within the
    /// arrival timeout or the falling edge within the pulse timeout.
    pub fn measure_echo(&self) -> Result<EchoWindow, EchoTimeout> {
        let start = self.wait_while(false, EchoEdge::Rising, self.arrival_timeout)?;
        let end = self.wait_while(true, EchoEdge::Falling, self.timeout)?;
        Ok(EchoWindow::new(start, end))
    }

    /// Spins while the echo line reads `level`, returning the time it changed.
    fn wait_while(
        &self,
        level: bool,
        edge: EchoEdge,
        timeout: Option<Duration>,
    ) -> Result<Timestamp, EchoTimeout> {
        match timeout {
            None => {
                while self.port.read_echo_line() == level {
                    std::hint::spin_loop();
                }
            }
            Some(timeout) => {
                let since = self.clock.now();
                while self.port.read_echo_line() == level {
                    let waited = self.clock.now().saturating_duration_since(since);
                    if waited >= timeout {
                        return Err(EchoTimeout { edge, waited });
                    }
                    std::hint::spin_loop();
                }
            }
        }
        Ok(self.clock.now())
    }
}
