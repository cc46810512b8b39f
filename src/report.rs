//! Human-readable output of samples and the final statistics.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use ranger_timing::{Sample, Statistics};

/// One sample as published on the report topic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleReport {
    pub index: usize,
    pub sample: Sample,
}

pub fn format_sample(report: &SampleReport) -> String {
    match report.sample {
        Sample::Measured(reading) => match reading.distance_inches() {
            Some(distance) => format!(
                "Echo Duration : {:.6} s Measured Distance : {:3.0} inches",
                reading.duration_seconds(),
                distance
            ),
            None => format!(
                "Echo Duration : {:.6} s Measured Distance : **********",
                reading.duration_seconds()
            ),
        },
        Sample::TimedOut(timeout) => format!(
            "Echo Duration : timed out waiting for {} edge after {:?}",
            timeout.edge, timeout.waited
        ),
    }
}

pub fn format_summary(stats: &Statistics) -> Vec<String> {
    let mut lines = Vec::new();
    match stats.range() {
        Some((min, max)) => {
            lines.push(format!("Maximum Measured Distance : {:3.0} inches", max));
            lines.push(format!("Minimum Measured Distance : {:3.0} inches", min));
        }
        None => lines.push("No valid distance measured".to_string()),
    }
    lines.push(format!(
        "Valid readings : {} of {} ({} implausible, {} timed out)",
        stats.valid_count(),
        stats.sample_count(),
        stats.invalid_count(),
        stats.timed_out_count()
    ));
    lines
}

/// Prints every published sample until the topic closes. Returns the number printed.
pub async fn run_reporter(mut rx: broadcast::Receiver<Arc<SampleReport>>) -> anyhow::Result<usize> {
    info!("Reporter task started.");
    let mut printed = 0;
    loop {
        match rx.recv().await {
            Ok(report) => {
                debug!(index = report.index, "Reporting sample.");
                println!("{}", format_sample(&report));
                printed += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Reporter fell behind, samples not shown.");
            }
            Err(RecvError::Closed) => break,
        }
    }
    info!(printed, "Reporter task finished.");
    Ok(printed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Topic;
    use ranger_timing::{DistanceCalculator, EchoEdge, EchoTimeout};
    use std::time::Duration;

    fn measured(seconds: f64) -> SampleReport {
        SampleReport {
            index: 0,
            sample: Sample::Measured(DistanceCalculator::default().evaluate_seconds(seconds)),
        }
    }

    #[test]
    fn test_format_valid_sample() {
        assert_eq!(
            format_sample(&measured(0.01)),
            "Echo Duration : 0.010000 s Measured Distance :  68 inches"
        );
    }

    #[test]
    fn test_format_invalid_sample() {
        assert_eq!(
            format_sample(&measured(0.02)),
            "Echo Duration : 0.020000 s Measured Distance : **********"
        );
    }

    #[test]
    fn test_format_timed_out_sample() {
        let report = SampleReport {
            index: 3,
            sample: Sample::TimedOut(EchoTimeout {
                edge: EchoEdge::Falling,
                waited: Duration::from_millis(60),
            }),
        };
        assert_eq!(
            format_sample(&report),
            "Echo Duration : timed out waiting for falling edge after 60ms"
        );
    }

    #[test]
    fn test_summary_never_reports_sentinels() {
        let mut stats = Statistics::new();
        stats.record_timeout();
        let lines = format_summary(&stats);
        assert_eq!(lines[0], "No valid distance measured");
        assert!(lines.iter().all(|l| !l.contains("inf")));
    }

    #[test]
    fn test_summary_with_readings() {
        let mut stats = Statistics::new();
        for d in [10.0, 25.0, 5.0] {
            stats.fold_distance(d);
        }
        let lines = format_summary(&stats);
        assert_eq!(lines[0], "Maximum Measured Distance :  25 inches");
        assert_eq!(lines[1], "Minimum Measured Distance :   5 inches");
        assert_eq!(lines[2], "Valid readings : 3 of 3 (0 implausible, 0 timed out)");
    }

    #[tokio::test]
    async fn test_reporter_drains_until_closed() {
        let topic: Topic<SampleReport> = Topic::new(8);
        let rx = topic.subscribe();
        let handle = tokio::spawn(run_reporter(rx));
        topic.publish(measured(0.01));
        topic.publish(measured(0.02));
        drop(topic);
        assert_eq!(handle.await.unwrap().unwrap(), 2);
    }
}
