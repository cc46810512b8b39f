use parking_lot::RwLock;
use std::{sync::Arc, time::Instant};

use ranger_timing::Sample;

/// Latest view of the sampling run, shared with the watchdog.
#[derive(Clone)]
pub struct State {
    pub samples_taken: u32,
    pub last_sample: Option<Sample>,
    pub last_sample_ts: Instant,
    pub faults: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        State {
            samples_taken: 0,
            last_sample: None,
            last_sample_ts: Instant::now(),
            faults: Vec::new(),
        }
    }
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

pub fn touch_sample(bb: &Blackboard, sample: &Sample) {
    let mut g = bb.write();
    g.samples_taken += 1;
    g.last_sample = Some(*sample);
    g.last_sample_ts = Instant::now();
}

/// Records `msg` once; repeated faults are not duplicated.
pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}
