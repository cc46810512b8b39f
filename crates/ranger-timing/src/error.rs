use std::time::Duration;

use thiserror::Error;

/// Which edge of the echo pulse the timer was waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoEdge {
    /// Waiting for the echo line to assert.
    Rising,
    /// Waiting for the echo line to deassert.
    Falling,
}

impl std::fmt::Display for EchoEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EchoEdge::Rising => write!(f, "rising"),
            EchoEdge::Falling => write!(f, "falling"),
        }
    }
}

/// The echo line did not toggle within the configured timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("echo line stalled waiting for {edge} edge after {waited:?}")]
pub struct EchoTimeout {
    /// Edge that never arrived.
    pub edge: EchoEdge,
    /// Time spent polling before giving up.
    pub waited: Duration,
}

/// Errors raised by the timing engine.
#[derive(Debug, Clone, Error)]
pub enum TimingError {
    /// The digital I/O port could not be mapped or initialised.
    #[error("hardware initialisation failed: {0}")]
    HardwareInit(String),
    /// The timer scheduling service refused to arm a tick.
    #[error("failed to arm timer: {0}")]
    TimerArm(&'static str),
    /// A register access on an already mapped port failed.
    #[error("port I/O failed: {0}")]
    PortIo(String),
}
