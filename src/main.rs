mod blackboard; // shared sampling state
mod bus; // broadcast topics
mod config;
mod interrupt;
mod report;
mod watchdog;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

use blackboard::{Blackboard, snapshot, touch_sample};
use bus::Topic;
use crate::config::{PortBackend, Settings};
use ranger_timing::{
    CancelToken, DevPortIo, DigitalPort, EchoTimer, PulseGenerator, Sampler, SimulatedTransceiver,
    SpinTimer, SystemClock,
};
use report::SampleReport;

/// Exit status after an abort on a second interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Ultrasonic ranger starting.");

    let settings = Settings::load().context("loading configuration")?;
    match run(settings).await {
        Ok(()) => {
            info!("Ultrasonic ranger finished.");
            Ok(())
        }
        Err(e) => {
            error!("Ultrasonic ranger aborted: {:#}", e);
            Err(e)
        }
    }
}

fn open_port(settings: &Settings) -> anyhow::Result<Arc<dyn DigitalPort>> {
    let port: Arc<dyn DigitalPort> = match settings.port.backend {
        PortBackend::DevPort => Arc::new(
            DevPortIo::open(settings.registers()).context("mapping digital I/O registers")?,
        ),
        PortBackend::Simulated => {
            warn!(
                target_inches = settings.simulation.target_inches,
                "Using simulated transceiver."
            );
            Arc::new(SimulatedTransceiver::new(settings.simulation()))
        }
    };
    Ok(port)
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let port = open_port(&settings)?;
    let calculator = settings.calculator().context("invalid plausibility settings")?;
    let window = calculator.window();
    info!(
        lower_s = window.lower_seconds(),
        upper_s = window.upper_seconds(),
        speed_of_sound = calculator.speed_of_sound(),
        "Distance calculator configured."
    );

    let timer = Arc::new(SpinTimer::new()?);
    let pulse = PulseGenerator::new(Arc::clone(&port), timer.clone(), settings.pulse_timing());
    pulse.start().context("arming trigger pulse timer")?;

    let bb: Blackboard = Arc::default();
    let report_topic: Topic<SampleReport> = Topic::new(64);
    let reporter = tokio::spawn(report::run_reporter(report_topic.subscribe()));

    let watchdog = tokio::spawn(watchdog::watchdog(
        bb.clone(),
        pulse.clone(),
        Arc::clone(&port),
        settings.watchdog_period(),
        settings.stall_after(),
    ));

    let cancel = CancelToken::new();
    let abort = interrupt::wait_for_abort(cancel.clone(), tokio::signal::ctrl_c);

    println!("Ultrasonic Sensor Operation");

    let echo = EchoTimer::new(Arc::clone(&port), Arc::new(SystemClock::new()))
        .with_arrival_timeout(settings.echo_arrival_timeout())
        .with_timeout(settings.echo_timeout());
    let sampler = Sampler::new(echo, calculator);
    let sample_count = settings.sampling.count;
    let mut sampling = tokio::task::spawn_blocking({
        let bb = bb.clone();
        let topic = report_topic;
        move || {
            sampler.run(sample_count, &cancel, |index, sample| {
                touch_sample(&bb, sample);
                topic.publish(SampleReport {
                    index,
                    sample: *sample,
                });
            })
        }
    });

    let stats = tokio::select! {
        joined = &mut sampling => joined.context("sampling thread panicked")?,
        () = abort => {
            // The sampling thread may be spinning on a silent echo line and
            // cannot be joined; the runtime would wait for it on shutdown.
            pulse.stop();
            timer.shutdown();
            let state = snapshot(&bb);
            for fault in &state.faults {
                error!(fault = fault.as_str(), "Fault raised during sampling.");
            }
            error!(samples = state.samples_taken, "Sampling aborted by interrupt.");
            std::process::exit(EXIT_INTERRUPTED);
        }
    };

    pulse.stop();
    timer.shutdown();
    watchdog.abort();
    reporter.await.context("reporter task panicked")??;

    for line in report::format_summary(&stats) {
        println!("{}", line);
    }
    println!("End of ultrasonic sensor operation");

    let state = snapshot(&bb);
    for fault in &state.faults {
        warn!(fault = fault.as_str(), "Fault raised during sampling.");
    }
    info!(samples = state.samples_taken, %stats, "Sampling summary.");
    Ok(())
}
