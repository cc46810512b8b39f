//! Timing engine for an ultrasonic range finder.
//!
//! A [`PulseGenerator`] keeps the transceiver firing from a timer thread,
//! an [`EchoTimer`] busy-polls the echo line for one pulse, and a [`Sampler`]
//! turns a fixed number of pulses into [`Statistics`] through a
//! [`DistanceCalculator`]. The two sides share nothing but the port.

pub mod clock;
pub mod echo;
pub mod error;
pub mod port;
pub mod pulse;
pub mod sampling;
pub mod sim;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{MonotonicClock, SystemClock};
pub use echo::EchoTimer;
pub use error::{EchoEdge, EchoTimeout, TimingError};
pub use port::{DevPortIo, DigitalPort, DioRegisters};
pub use pulse::{PulseGenerator, PulseTiming, TriggerState};
pub use sampling::{CancelToken, Sample, Sampler};
pub use sim::{SimulatedTransceiver, SimulationConfig};
pub use timer::{SpinTimer, TimerCallback, TimerService};

pub use ranger_distance::{DistanceCalculator, Reading, Statistics};
