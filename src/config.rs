use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::{error, info};

use ranger_distance::{DistanceCalculator, PlausibilityWindow, RangingError};
use ranger_timing::{DioRegisters, PulseTiming, SimulationConfig};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_VAR: &str = "RANGER_CONFIG";

pub fn load_config() -> Result<Config, ConfigError> {
    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    info!("Attempting to load configuration from {}", path);

    // RANGER_SAMPLING__COUNT=20 overrides sampling.count
    let settings = Config::builder()
        .add_source(File::new(&path, FileFormat::Toml).required(true))
        .add_source(
            Environment::with_prefix("RANGER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build();

    match settings {
        Ok(config) => {
            info!("Successfully loaded configuration: {:?}", config);
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortBackend {
    Simulated,
    DevPort,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortSettings {
    pub backend: PortBackend,
    #[serde(default = "default_base_address")]
    pub base_address: u64,
}

fn default_base_address() -> u64 {
    0x288
}

#[derive(Debug, Clone, Deserialize)]
pub struct PulseSettings {
    pub asserted_us: u64,
    pub deasserted_us: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EchoSettings {
    /// Absent means no timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlausibilitySettings {
    pub lower_s: f64,
    pub upper_s: f64,
    pub speed_of_sound_in_per_s: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingSettings {
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    pub target_inches: f64,
    pub jitter_inches: f64,
    pub dropout_probability: f64,
    pub response_delay_us: u64,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSettings {
    pub period_ms: u64,
    pub stall_after_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub port: PortSettings,
    pub pulse: PulseSettings,
    #[serde(default)]
    pub echo: EchoSettings,
    pub plausibility: PlausibilitySettings,
    pub sampling: SamplingSettings,
    pub simulation: SimulationSettings,
    pub watchdog: WatchdogSettings,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        load_config()?.try_deserialize()
    }

    pub fn registers(&self) -> DioRegisters {
        DioRegisters::at_base(self.port.base_address)
    }

    pub fn pulse_timing(&self) -> PulseTiming {
        PulseTiming {
            asserted: Duration::from_micros(self.pulse.asserted_us),
            deasserted: Duration::from_micros(self.pulse.deasserted_us),
        }
    }

    /// Longest the echo line may stay high.
    pub fn echo_timeout(&self) -> Option<Duration> {
        self.echo.timeout_ms.map(Duration::from_millis)
    }

    /// Longest wait for an echo to begin: one full trigger period plus the
    /// echo timeout, so a healthy sensor resting between pulses never hits it.
    pub fn echo_arrival_timeout(&self) -> Option<Duration> {
        self.echo_timeout()
            .map(|timeout| self.pulse_timing().period() + timeout)
    }

    pub fn calculator(&self) -> Result<DistanceCalculator, RangingError> {
        let window = PlausibilityWindow::new(self.plausibility.lower_s, self.plausibility.upper_s)?;
        DistanceCalculator::new(window, self.plausibility.speed_of_sound_in_per_s)
    }

    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            target_inches: self.simulation.target_inches,
            jitter_inches: self.simulation.jitter_inches,
            dropout_probability: self.simulation.dropout_probability,
            response_delay: Duration::from_micros(self.simulation.response_delay_us),
            speed_of_sound: self.plausibility.speed_of_sound_in_per_s,
            seed: self.simulation.seed,
        }
    }

    pub fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog.period_ms)
    }

    pub fn stall_after(&self) -> Duration {
        Duration::from_millis(self.watchdog.stall_after_ms)
    }
}
