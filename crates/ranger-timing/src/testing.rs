//! Deterministic echo line for tests: time only moves when the line is polled.

use std::sync::atomic::{AtomicU64, Ordering};

use ranger_distance::Timestamp;

use crate::clock::MonotonicClock;
use crate::port::DigitalPort;

/// Echo line and clock in one. Every `read_echo_line` advances time by
/// `tick_ns`; the line is high inside any of the scripted `(rise, fall)`
/// intervals.
pub(crate) struct ScriptedEcho {
    now_ns: AtomicU64,
    tick_ns: u64,
    pulses: Vec<(u64, u64)>,
}

impl ScriptedEcho {
    pub(crate) fn new(tick_ns: u64, pulses: Vec<(u64, u64)>) -> Self {
        ScriptedEcho {
            now_ns: AtomicU64::new(0),
            tick_ns,
            pulses,
        }
    }

    /// Lays out back-to-back pulses of the given widths separated by `gap_ns`.
    pub(crate) fn with_widths(tick_ns: u64, gap_ns: u64, widths_ns: &[u64]) -> Self {
        let mut at = gap_ns;
        let pulses = widths_ns
            .iter()
            .map(|w| {
                let pulse = (at, at + w);
                at += w + gap_ns;
                pulse
            })
            .collect();
        ScriptedEcho::new(tick_ns, pulses)
    }
}

impl DigitalPort for ScriptedEcho {
    fn write_trigger_line(&self, _asserted: bool) {}

    fn read_echo_line(&self) -> bool {
        let t = self.now_ns.fetch_add(self.tick_ns, Ordering::AcqRel) + self.tick_ns;
        self.pulses.iter().any(|&(rise, fall)| rise <= t && t < fall)
    }
}

impl MonotonicClock for ScriptedEcho {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.now_ns.load(Ordering::Acquire))
    }
}
