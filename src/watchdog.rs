use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use ranger_timing::{DigitalPort, PulseGenerator};

use crate::blackboard::{Blackboard, raise_fault, snapshot};

pub const ECHO_STALLED: &str = "echo stalled";

/// Raises faults when sampling stops making progress, the pulse train dies or
/// the port reports an I/O failure.
///
/// With no echo timeout configured the sampling thread can spin forever;
/// this task is the only place that notices.
pub async fn watchdog(
    bb: Blackboard,
    pulse: PulseGenerator,
    port: Arc<dyn DigitalPort>,
    period: Duration,
    stall_after: Duration,
) -> anyhow::Result<()> {
    info!("Watchdog task started.");
    let mut tick = tokio::time::interval(period);
    loop {
        tick.tick().await;
        check(&bb, &pulse, port.as_ref(), stall_after);
    }
}

fn check(bb: &Blackboard, pulse: &PulseGenerator, port: &dyn DigitalPort, stall_after: Duration) {
    let state = snapshot(bb);
    let age = Instant::now() - state.last_sample_ts;
    if age > stall_after {
        warn!(?age, samples_taken = state.samples_taken, "No echo sample completed, echo line may be stalled.");
        raise_fault(bb, ECHO_STALLED);
    }
    if let Some(fault) = pulse.fault() {
        error!(%fault, "Trigger pulse train has stopped.");
        raise_fault(bb, &format!("pulse train stopped: {}", fault));
    }
    if let Some(fault) = port.fault() {
        error!(%fault, "Digital I/O port failed.");
        raise_fault(bb, &fault.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::{Mutex, RwLock};
    use ranger_timing::{
        PulseTiming, SimulatedTransceiver, SimulationConfig, SpinTimer, TimerCallback,
        TimerService, TimingError,
    };
    use std::sync::atomic::{AtomicBool, Ordering};

    fn simulated() -> Arc<SimulatedTransceiver> {
        Arc::new(SimulatedTransceiver::new(SimulationConfig::default()))
    }

    fn idle_pulse() -> (PulseGenerator, Arc<SpinTimer>) {
        let timer = Arc::new(SpinTimer::new().unwrap());
        (PulseGenerator::new(simulated(), timer.clone(), PulseTiming::default()), timer)
    }

    #[test]
    fn test_stale_sample_raises_stall_fault() {
        let (pulse, _timer) = idle_pulse();
        let bb: Blackboard = Arc::new(RwLock::new(Default::default()));
        bb.write().last_sample_ts = Instant::now() - Duration::from_secs(5);
        check(&bb, &pulse, simulated().as_ref(), Duration::from_secs(1));
        assert_eq!(snapshot(&bb).faults, vec![ECHO_STALLED]);
    }

    #[test]
    fn test_fresh_sample_raises_nothing() {
        let (pulse, _timer) = idle_pulse();
        let bb: Blackboard = Arc::default();
        check(&bb, &pulse, simulated().as_ref(), Duration::from_secs(1));
        assert!(snapshot(&bb).faults.is_empty());
    }

    /// Accepts one schedule and refuses every later one.
    #[derive(Default)]
    struct OnceTimer {
        armed: Mutex<Option<TimerCallback>>,
        used: AtomicBool,
    }

    impl TimerService for OnceTimer {
        fn schedule(&self, _delay: Duration, callback: TimerCallback) -> Result<(), TimingError> {
            if self.used.swap(true, Ordering::AcqRel) {
                return Err(TimingError::TimerArm("already used"));
            }
            *self.armed.lock() = Some(callback);
            Ok(())
        }
    }

    #[test]
    fn test_refused_rearm_raises_pulse_fault() {
        let timer = Arc::new(OnceTimer::default());
        let port = simulated();
        let pulse = PulseGenerator::new(port.clone(), timer.clone(), PulseTiming::default());
        pulse.start().unwrap();
        let first_tick = timer.armed.lock().take().unwrap();
        first_tick();

        let bb: Blackboard = Arc::default();
        check(&bb, &pulse, port.as_ref(), Duration::from_secs(1));
        let faults = snapshot(&bb).faults;
        assert_eq!(faults.len(), 1);
        assert!(faults[0].starts_with("pulse train stopped"));
    }

    struct BrokenPort;

    impl DigitalPort for BrokenPort {
        fn write_trigger_line(&self, _asserted: bool) {}

        fn read_echo_line(&self) -> bool {
            false
        }

        fn fault(&self) -> Option<TimingError> {
            Some(TimingError::PortIo("register 0x289: unexpected end of file".into()))
        }
    }

    #[test]
    fn test_port_failure_raises_fault() {
        let (pulse, _timer) = idle_pulse();
        let bb: Blackboard = Arc::default();
        check(&bb, &pulse, &BrokenPort, Duration::from_secs(1));
        check(&bb, &pulse, &BrokenPort, Duration::from_secs(1));
        assert_eq!(
            snapshot(&bb).faults,
            vec!["port I/O failed: register 0x289: unexpected end of file"]
        );
    }
}
