//! Fixed-count sampling loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ranger_distance::{DistanceCalculator, Reading, Statistics};
use tracing::{debug, info, trace, warn};

use crate::echo::EchoTimer;
use crate::error::EchoTimeout;

/// Shared flag asking a sampling run to stop between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Result of one sampling iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// An echo was timed; the reading may still be implausible.
    Measured(Reading),
    /// The echo line stalled past the timeout.
    TimedOut(EchoTimeout),
}

impl Sample {
    pub fn reading(&self) -> Option<&Reading> {
        match self {
            Sample::Measured(reading) => Some(reading),
            Sample::TimedOut(_) => None,
        }
    }

    pub fn distance_inches(&self) -> Option<f64> {
        self.reading().and_then(Reading::distance_inches)
    }
}

/// Runs echo measurement and distance evaluation back to back.
///
/// The sampler never touches the trigger line; it only assumes something
/// else keeps the sensor firing.
pub struct Sampler {
    echo: EchoTimer,
    calculator: DistanceCalculator,
}

impl Sampler {
    pub fn new(echo: EchoTimer, calculator: DistanceCalculator) -> Self {
        Sampler { echo, calculator }
    }

    /// Takes one sample.
    pub fn sample(&self) -> Sample {
        match self.echo.measure_echo() {
            Ok(window) => {
                trace!(start_ns = window.start.as_nanos(), width = ?window.duration(), "Echo timed.");
                Sample::Measured(self.calculator.evaluate(window))
            }
            Err(timeout) => Sample::TimedOut(timeout),
        }
    }

    /// Takes `sample_count` samples and returns their statistics.
    ///
    /// Every sample is passed to `on_sample` with its zero-based index. No
    /// sample is fatal: invalid readings and timeouts are counted and the
    /// loop moves on. `cancel` is checked before each iteration, so a
    /// cancelled run returns the statistics gathered so far.
    pub fn run<F>(&self, sample_count: usize, cancel: &CancelToken, mut on_sample: F) -> Statistics
    where
        F: FnMut(usize, &Sample),
    {
        info!(
            sample_count,
            arrival_timeout = ?self.echo.arrival_timeout(),
            timeout = ?self.echo.timeout(),
            "Sampling started."
        );
        let mut stats = Statistics::new();

        for index in 0..sample_count {
            if cancel.is_cancelled() {
                warn!(completed = index, sample_count, "Sampling cancelled.");
                break;
            }

            let sample = self.sample();
            match &sample {
                Sample::Measured(reading) => {
                    stats.fold(reading);
                    debug!(index, %reading, "Sample taken.");
                }
                Sample::TimedOut(timeout) => {
                    stats.record_timeout();
                    warn!(index, %timeout, "Echo timed out.");
                }
            }
            on_sample(index, &sample);
        }

        info!(%stats, "Sampling finished.");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EchoEdge;
    use crate::testing::ScriptedEcho;
    use std::time::Duration;

    const TICK_NS: u64 = 100;
    const GAP_NS: u64 = 1_000_000;

    fn width_for(inches: f64) -> u64 {
        let ns = DistanceCalculator::default().round_trip_seconds(inches) * 1e9;
        ((ns / TICK_NS as f64).round() as u64) * TICK_NS
    }

    fn sampler_for(widths_ns: &[u64], timeout: Option<Duration>) -> Sampler {
        let script = Arc::new(ScriptedEcho::with_widths(TICK_NS, GAP_NS, widths_ns));
        let echo = EchoTimer::new(script.clone(), script)
            .with_arrival_timeout(timeout)
            .with_timeout(timeout);
        Sampler::new(echo, DistanceCalculator::default())
    }

    #[test]
    fn test_min_max_over_three_samples() {
        let widths: Vec<u64> = [10.0, 25.0, 5.0].iter().map(|&d| width_for(d)).collect();
        let sampler = sampler_for(&widths, None);
        let stats = sampler.run(3, &CancelToken::new(), |_, _| {});
        let (min, max) = stats.range().unwrap();
        assert!((min - 5.0).abs() < 0.01);
        assert!((max - 25.0).abs() < 0.01);
        assert_eq!(stats.valid_count(), 3);
    }

    #[test]
    fn test_invalid_readings_are_skipped() {
        let widths = [width_for(30.0), 10_000, 25_000_000, width_for(12.0)];
        let sampler = sampler_for(&widths, None);
        let mut seen = Vec::new();
        let stats = sampler.run(4, &CancelToken::new(), |index, sample| {
            seen.push((index, sample.distance_inches().is_some()));
        });
        assert_eq!(seen, vec![(0, true), (1, false), (2, false), (3, true)]);
        assert_eq!(stats.invalid_count(), 2);
        let (min, max) = stats.range().unwrap();
        assert!((min - 12.0).abs() < 0.01);
        assert!((max - 30.0).abs() < 0.01);
    }

    #[test]
    fn test_runs_exactly_sample_count_iterations() {
        let widths = vec![width_for(20.0); 10];
        let sampler = sampler_for(&widths, None);
        let mut calls = 0;
        let stats = sampler.run(7, &CancelToken::new(), |_, _| calls += 1);
        assert_eq!(calls, 7);
        assert_eq!(stats.sample_count(), 7);
    }

    #[test]
    fn test_only_invalid_readings_leave_no_range() {
        let sampler = sampler_for(&[5_000, 30_000_000], None);
        let stats = sampler.run(2, &CancelToken::new(), |_, _| {});
        assert_eq!(stats.range(), None);
        assert_eq!(stats.invalid_count(), 2);
    }

    #[test]
    fn test_timeouts_are_counted_and_loop_continues() {
        let sampler = sampler_for(&[width_for(40.0)], Some(Duration::from_millis(5)));
        let mut timeouts = Vec::new();
        let stats = sampler.run(3, &CancelToken::new(), |_, sample| {
            if let Sample::TimedOut(t) = sample {
                timeouts.push(t.edge);
            }
        });
        assert_eq!(stats.valid_count(), 1);
        assert_eq!(stats.timed_out_count(), 2);
        assert_eq!(timeouts, vec![EchoEdge::Rising, EchoEdge::Rising]);
    }

    #[test]
    fn test_cancel_stops_between_iterations() {
        let widths = vec![width_for(20.0); 10];
        let sampler = sampler_for(&widths, None);
        let cancel = CancelToken::new();
        let stats = sampler.run(10, &cancel, |index, _| {
            if index == 1 {
                cancel.cancel();
            }
        });
        assert_eq!(stats.sample_count(), 2);
    }

    #[test]
    fn test_cancelled_before_start_takes_no_samples() {
        let sampler = sampler_for(&[], None);
        let cancel = CancelToken::new();
        cancel.cancel();
        let stats = sampler.run(500, &cancel, |_, _| panic!("no sample expected"));
        assert_eq!(stats, Statistics::new());
    }
}
