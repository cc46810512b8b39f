//! Software stand-in for the transceiver, for running without the DIO board.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use ranger_distance::SPEED_OF_SOUND_INCHES_PER_SECOND;

use crate::port::DigitalPort;

/// Width of the pulse the sensor emits when no reflection arrives.
const NO_ECHO_PULSE: Duration = Duration::from_millis(38);

/// Behaviour of the simulated sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Distance to the simulated obstacle (in).
    pub target_inches: f64,
    /// Uniform noise added to each echo, +/- this many inches.
    pub jitter_inches: f64,
    /// Probability in `[0, 1]` that a trigger gets no reflection.
    pub dropout_probability: f64,
    /// Time between the trigger falling edge and the echo rising edge.
    pub response_delay: Duration,
    pub speed_of_sound: f64,
    /// Fixed RNG seed, `None` to seed from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            target_inches: 48.0,
            jitter_inches: 1.5,
            dropout_probability: 0.02,
            response_delay: Duration::from_micros(450),
            speed_of_sound: SPEED_OF_SOUND_INCHES_PER_SECOND,
            seed: None,
        }
    }
}

#[derive(Debug)]
struct Sensor {
    trigger_high: bool,
    echo: Option<(Instant, Instant)>,
    rng: StdRng,
}

/// Answers every trigger pulse with an echo pulse on the echo line.
///
/// The echo starts `response_delay` after the trigger falling edge. A trigger
/// arriving while an echo is still pending or in flight is ignored, as the
/// real sensor does.
#[derive(Debug)]
pub struct SimulatedTransceiver {
    config: SimulationConfig,
    sensor: Mutex<Sensor>,
}

impl SimulatedTransceiver {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        SimulatedTransceiver {
            config,
            sensor: Mutex::new(Sensor {
                trigger_high: false,
                echo: None,
                rng,
            }),
        }
    }

    fn echo_width(&self, rng: &mut StdRng) -> Duration {
        if rng.random_bool(self.config.dropout_probability.clamp(0.0, 1.0)) {
            return NO_ECHO_PULSE;
        }
        let jitter = if self.config.jitter_inches > 0.0 {
            rng.random_range(-self.config.jitter_inches..=self.config.jitter_inches)
        } else {
            0.0
        };
        let distance = (self.config.target_inches + jitter).max(0.0);
        Duration::from_secs_f64(distance * 2.0 / self.config.speed_of_sound)
    }
}

impl DigitalPort for SimulatedTransceiver {
    fn write_trigger_line(&self, asserted: bool) {
        let now = Instant::now();
        let mut sensor = self.sensor.lock();
        let falling_edge = sensor.trigger_high && !asserted;
        sensor.trigger_high = asserted;
        if !falling_edge {
            return;
        }
        let busy = matches!(sensor.echo, Some((_, end)) if now < end);
        if busy {
            trace!("Simulated sensor busy, trigger ignored.");
            return;
        }
        let width = self.echo_width(&mut sensor.rng);
        let start = now + self.config.response_delay;
        sensor.echo = Some((start, start + width));
        trace!(?width, "Simulated echo scheduled.");
    }

    fn read_echo_line(&self) -> bool {
        let now = Instant::now();
        match self.sensor.lock().echo {
            Some((start, end)) => start <= now && now < end,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(target_inches: f64) -> SimulationConfig {
        SimulationConfig {
            target_inches,
            jitter_inches: 0.0,
            dropout_probability: 0.0,
            response_delay: Duration::from_micros(100),
            seed: Some(7),
            ..SimulationConfig::default()
        }
    }

    fn pulse(sim: &SimulatedTransceiver) {
        sim.write_trigger_line(true);
        sim.write_trigger_line(false);
    }

    fn wait_for(sim: &SimulatedTransceiver, level: bool) -> Instant {
        let deadline = Instant::now() + Duration::from_secs(1);
        while sim.read_echo_line() != level {
            assert!(Instant::now() < deadline, "echo line never reached {}", level);
            std::hint::spin_loop();
        }
        Instant::now()
    }

    #[test]
    fn test_echo_follows_trigger_falling_edge() {
        let sim = SimulatedTransceiver::new(quiet(60.0));
        assert!(!sim.read_echo_line());
        sim.write_trigger_line(true);
        std::thread::sleep(Duration::from_millis(2));
        assert!(!sim.read_echo_line());
        sim.write_trigger_line(false);
        assert!(sim.sensor.lock().echo.is_some());

        let rise = wait_for(&sim, true);
        let fall = wait_for(&sim, false);
        let width = fall - rise;
        let expected = Duration::from_secs_f64(120.0 / SPEED_OF_SOUND_INCHES_PER_SECOND);
        assert!(width + Duration::from_micros(200) >= expected);
        assert!(width <= expected + Duration::from_millis(5));
    }

    #[test]
    fn test_trigger_while_busy_is_ignored() {
        let sim = SimulatedTransceiver::new(quiet(100.0));
        pulse(&sim);
        let first = sim.sensor.lock().echo;
        pulse(&sim);
        assert_eq!(sim.sensor.lock().echo, first);
    }

    #[test]
    fn test_dropout_produces_overlong_pulse() {
        let sim = SimulatedTransceiver::new(SimulationConfig {
            dropout_probability: 1.0,
            ..quiet(10.0)
        });
        pulse(&sim);
        let (start, end) = sim.sensor.lock().echo.unwrap();
        assert_eq!(end - start, NO_ECHO_PULSE);
    }

    #[test]
    fn test_level_writes_without_falling_edge_do_nothing() {
        let sim = SimulatedTransceiver::new(quiet(10.0));
        sim.write_trigger_line(false);
        sim.write_trigger_line(true);
        sim.write_trigger_line(true);
        assert!(sim.sensor.lock().echo.is_none());
    }
}
