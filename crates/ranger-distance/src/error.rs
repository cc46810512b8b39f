#![warn(missing_docs)]

//! Error types for the distance library.
//!
//! Echo readings outside the plausibility window are not errors; they are
//! returned as invalid [`Reading`](crate::Reading)s. The errors here only
//! cover calculator configuration that cannot describe a physical sensor.

use core::fmt;

/// Errors that can occur when configuring a distance calculator.
#[derive(Debug, Clone, PartialEq)]
pub enum RangingError {
    /// The plausibility window is empty, negative or not finite.
    InvalidWindow(&'static str),
    /// The speed of sound is not a positive, finite value.
    InvalidSpeedOfSound(&'static str),
}

impl core::fmt::Display for RangingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangingError::InvalidWindow(msg) => write!(f, "Invalid plausibility window: {}", msg),
            RangingError::InvalidSpeedOfSound(msg) => write!(f, "Invalid speed of sound: {}", msg),
        }
    }
}

impl core::error::Error for RangingError {}
