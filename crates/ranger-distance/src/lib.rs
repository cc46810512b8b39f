#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` library for ultrasonic echo evaluation."]
#![doc = ""]
#![doc = "This crate turns the edges of an echo pulse into a validated distance reading"]
#![doc = "and folds readings into running minimum/maximum statistics."]

use core::fmt;
use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::RangingError;

/// Echo pulses at or below this width (s) are treated as sensor noise.
pub const LOWER_BOUND_SECONDS: f64 = 0.000_02;

/// Echo pulses at or above this width (s) are out of range or missing echoes.
pub const UPPER_BOUND_SECONDS: f64 = 0.018;

/// Speed of sound in inches per second.
pub const SPEED_OF_SOUND_INCHES_PER_SECOND: f64 = 13_544.08;

/// A point on a monotonic clock, in nanoseconds since an arbitrary origin.
///
/// Only differences between two timestamps taken from the same clock are
/// meaningful. They never represent wall-clock time.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Construct a timestamp from a nanosecond count.
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    /// Returns the raw nanosecond count.
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    pub const fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Returns the timestamp `delta` after `self`, saturating at the end of the clock.
    pub fn saturating_add(&self, delta: Duration) -> Timestamp {
        let nanos = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(nanos))
    }
}

/// Rising and falling edge of one echo pulse.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoWindow {
    /// Time the echo line was first seen asserted.
    pub start: Timestamp,
    /// Time the echo line was first seen deasserted again.
    pub end: Timestamp,
}

impl EchoWindow {
    /// Construct a new echo window.
    pub const fn new(start: Timestamp, end: Timestamp) -> Self {
        EchoWindow { start, end }
    }

    /// Width of the echo pulse.
    pub const fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }

    /// Width of the echo pulse in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.duration().as_secs_f64()
    }
}

/// The outcome of evaluating one echo window.
///
/// A reading always carries the measured duration. The distance is only
/// present when the duration fell inside the plausibility window.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    duration_seconds: f64,
    distance_inches: Option<f64>,
}

impl Reading {
    /// Measured echo width in seconds.
    pub const fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Distance to the obstacle in inches, `None` for implausible echoes.
    pub const fn distance_inches(&self) -> Option<f64> {
        self.distance_inches
    }

    /// Whether the echo width was inside the plausibility window.
    pub const fn is_valid(&self) -> bool {
        self.distance_inches.is_some()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.distance_inches {
            Some(d) => write!(f, "(echo: {:.6} s, distance: {:.1} in)", self.duration_seconds, d),
            None => write!(f, "(echo: {:.6} s, invalid)", self.duration_seconds),
        }
    }
}

/// Open interval of echo widths accepted as physically plausible.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibilityWindow {
    lower_seconds: f64,
    upper_seconds: f64,
}

impl PlausibilityWindow {
    /// Construct a plausibility window.
    ///
    /// # Arguments
    ///
    /// * `lower_seconds`: Exclusive lower bound on the echo width.
    /// * `upper_seconds`: Exclusive upper bound on the echo width.
    ///
    /// # Errors
    ///
    /// Returns `Err(RangingError::InvalidWindow)` if a bound is negative or not finite,
    /// or if `lower_seconds` is not strictly below `upper_seconds`.
    pub fn new(lower_seconds: f64, upper_seconds: f64) -> Result<Self, RangingError> {
        if !lower_seconds.is_finite() || !upper_seconds.is_finite() {
            return Err(RangingError::InvalidWindow("bounds must be finite"));
        }
        if lower_seconds < 0.0 {
            return Err(RangingError::InvalidWindow("lower bound must be non-negative"));
        }
        if lower_seconds >= upper_seconds {
            return Err(RangingError::InvalidWindow(
                "lower bound must be below upper bound",
            ));
        }
        Ok(PlausibilityWindow {
            lower_seconds,
            upper_seconds,
        })
    }

    /// Returns the exclusive lower bound (s).
    pub fn lower_seconds(&self) -> f64 {
        self.lower_seconds
    }

    /// Returns the exclusive upper bound (s).
    pub fn upper_seconds(&self) -> f64 {
        self.upper_seconds
    }

    /// Whether `duration_seconds` lies strictly inside the window.
    pub fn contains(&self, duration_seconds: f64) -> bool {
        duration_seconds > self.lower_seconds && duration_seconds < self.upper_seconds
    }
}

impl Default for PlausibilityWindow {
    fn default() -> Self {
        PlausibilityWindow {
            lower_seconds: LOWER_BOUND_SECONDS,
            upper_seconds: UPPER_BOUND_SECONDS,
        }
    }
}

impl fmt::Display for PlausibilityWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6} s, {:.6} s)", self.lower_seconds, self.upper_seconds)
    }
}

/// Converts echo windows into readings.
///
/// The calculator is a pure function of its configuration and the window it
/// is given; it keeps no state between calls.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceCalculator {
    window: PlausibilityWindow,
    /// Speed of sound (in/s).
    speed_of_sound: f64,
}

impl DistanceCalculator {
    /// Construct a calculator.
    ///
    /// # Arguments
    ///
    /// * `window`: Echo widths accepted as plausible.
    /// * `speed_of_sound`: Speed of sound in inches per second.
    ///
    /// # Errors
    ///
    /// Returns `Err(RangingError::InvalidSpeedOfSound)` if `speed_of_sound` is not positive and finite.
    pub fn new(window: PlausibilityWindow, speed_of_sound: f64) -> Result<Self, RangingError> {
        if !speed_of_sound.is_finite() || speed_of_sound <= 0.0 {
            return Err(RangingError::InvalidSpeedOfSound("must be positive and finite"));
        }
        Ok(DistanceCalculator {
            window,
            speed_of_sound,
        })
    }

    /// Returns the plausibility window.
    pub fn window(&self) -> PlausibilityWindow {
        self.window
    }

    /// Returns the speed of sound (in/s).
    pub fn speed_of_sound(&self) -> f64 {
        self.speed_of_sound
    }

    /// Evaluates one echo window.
    ///
    /// The distance is half the round-trip path: `duration * speed / 2`.
    pub fn evaluate(&self, window: EchoWindow) -> Reading {
        self.evaluate_seconds(window.duration_seconds())
    }

    /// Evaluates an echo width given directly in seconds.
    pub fn evaluate_seconds(&self, duration_seconds: f64) -> Reading {
        let distance_inches = if self.window.contains(duration_seconds) {
            Some(duration_seconds * self.speed_of_sound / 2.0)
        } else {
            None
        };
        Reading {
            duration_seconds,
            distance_inches,
        }
    }

    /// Echo width a target at `distance_inches` would produce.
    pub fn round_trip_seconds(&self, distance_inches: f64) -> f64 {
        distance_inches * 2.0 / self.speed_of_sound
    }
}

impl Default for DistanceCalculator {
    fn default() -> Self {
        DistanceCalculator {
            window: PlausibilityWindow::default(),
            speed_of_sound: SPEED_OF_SOUND_INCHES_PER_SECOND,
        }
    }
}

impl fmt::Display for DistanceCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DistanceCalculator (window: {}, c: {:.2} in/s)", self.window, self.speed_of_sound)
    }
}

/// Running extremes over the valid readings of one sampling run.
///
/// `min_inches` starts above and `max_inches` below any possible distance, so
/// the first valid reading replaces both. Until then the extremes are
/// sentinels and [`Statistics::range`] returns `None`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    min_inches: f64,
    max_inches: f64,
    valid: u32,
    invalid: u32,
    timed_out: u32,
}

impl Statistics {
    /// Statistics with no readings folded in.
    pub const fn new() -> Self {
        Statistics {
            min_inches: f64::INFINITY,
            max_inches: f64::NEG_INFINITY,
            valid: 0,
            invalid: 0,
            timed_out: 0,
        }
    }

    /// Folds a reading in. Invalid readings are only counted.
    pub fn fold(&mut self, reading: &Reading) {
        match reading.distance_inches {
            Some(distance) => self.fold_distance(distance),
            None => self.invalid += 1,
        }
    }

    /// Folds a valid distance in.
    pub fn fold_distance(&mut self, distance_inches: f64) {
        self.valid += 1;
        self.min_inches = self.min_inches.min(distance_inches);
        self.max_inches = self.max_inches.max(distance_inches);
    }

    /// Counts a sample whose echo never completed.
    pub fn record_timeout(&mut self) {
        self.timed_out += 1;
    }

    /// `(min, max)` in inches, or `None` before any valid reading.
    pub fn range(&self) -> Option<(f64, f64)> {
        (self.valid > 0).then_some((self.min_inches, self.max_inches))
    }

    /// Smallest valid distance (in), if any.
    pub fn min_inches(&self) -> Option<f64> {
        self.range().map(|(min, _)| min)
    }

    /// Largest valid distance (in), if any.
    pub fn max_inches(&self) -> Option<f64> {
        self.range().map(|(_, max)| max)
    }

    /// Number of valid readings folded in.
    pub fn valid_count(&self) -> u32 {
        self.valid
    }

    /// Number of implausible readings seen.
    pub fn invalid_count(&self) -> u32 {
        self.invalid
    }

    /// Number of samples lost to an echo timeout.
    pub fn timed_out_count(&self) -> u32 {
        self.timed_out
    }

    /// Total samples accounted for.
    pub fn sample_count(&self) -> u32 {
        self.valid + self.invalid + self.timed_out
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Statistics::new()
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.range() {
            Some((min, max)) => write!(
                f,
                "(min: {:.1} in, max: {:.1} in, valid: {}/{})",
                min,
                max,
                self.valid,
                self.sample_count()
            ),
            None => write!(f, "(no valid readings, samples: {})", self.sample_count()),
        }
    }
}
