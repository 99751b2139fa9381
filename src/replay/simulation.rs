use crate::config::ProximityConfig;
use crate::error::Result;
use crate::nav::{Classification, Fix, NavigationController, Segment};
use crate::telemetry::TelemetryRecord;
use std::fmt;
use tracing::debug;

/// Fix indices at which each alert is expected to first show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expectation {
    pub get_ready: Option<usize>,
    pub finished: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    GetReady,
    PullCord,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::GetReady => write!(f, "Get ready"),
            Alert::PullCord => write!(f, "Pull the cord"),
        }
    }
}

/// A difference between a replay and what was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    TooSoon { alert: Alert, expected: usize, actual: usize },
    TooLate { alert: Alert, expected: usize, actual: usize },
    Never { alert: Alert, expected: usize },
    Unexpected { alert: Alert, actual: usize },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::TooSoon { alert, expected, actual } => write!(
                f,
                "{} triggered too soon (fix {}, expected {})",
                alert, actual, expected
            ),
            Mismatch::TooLate { alert, expected, actual } => write!(
                f,
                "{} triggered too late (fix {}, expected {})",
                alert, actual, expected
            ),
            Mismatch::Never { alert, expected } => {
                write!(f, "{} never triggered (expected at fix {})", alert, expected)
            }
            Mismatch::Unexpected { alert, actual } => {
                write!(f, "{} triggered at fix {} but was never recorded", alert, actual)
            }
        }
    }
}

/// Outcome of feeding a fix stream through a controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationReport {
    /// First fix that fired "get ready"
    pub get_ready_at: Option<usize>,
    /// Fix that finished the trip
    pub finished_at: Option<usize>,
    /// Fixes that completed a segment, in order
    pub advances: Vec<usize>,
    /// Fixes the engine rejected
    pub rejected: Vec<usize>,
    pub transcript: Vec<TelemetryRecord>,
}

impl SimulationReport {
    /// Build a report from an existing telemetry transcript.
    pub fn from_transcript(records: &[TelemetryRecord]) -> Self {
        let mut report = Self::default();
        for record in records {
            report.observe(record.clone());
        }
        report
    }

    /// Fold one classified fix into the report.
    pub fn observe(&mut self, record: TelemetryRecord) {
        let seq = record.seq as usize;
        match record.classification {
            Classification::GetReady if self.get_ready_at.is_none() => {
                self.get_ready_at = Some(seq);
            }
            Classification::StopReached => self.advances.push(seq),
            _ => {}
        }
        if record.finished && self.finished_at.is_none() {
            self.finished_at = Some(seq);
        }
        self.transcript.push(record);
    }

    pub fn reject(&mut self, seq: usize) {
        self.rejected.push(seq);
    }

    /// Compare against the recorded alert positions.
    pub fn check(&self, expected: &Expectation) -> Vec<Mismatch> {
        [
            compare(Alert::GetReady, expected.get_ready, self.get_ready_at),
            compare(Alert::PullCord, expected.finished, self.finished_at),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn compare(alert: Alert, expected: Option<usize>, actual: Option<usize>) -> Option<Mismatch> {
    match (expected, actual) {
        (Some(expected), Some(actual)) if actual < expected => Some(Mismatch::TooSoon {
            alert,
            expected,
            actual,
        }),
        (Some(expected), Some(actual)) if actual > expected => Some(Mismatch::TooLate {
            alert,
            expected,
            actual,
        }),
        (Some(expected), None) => Some(Mismatch::Never { alert, expected }),
        (None, Some(actual)) => Some(Mismatch::Unexpected { alert, actual }),
        _ => None,
    }
}

/// Drive a fresh controller through `fixes` synchronously.
///
/// With `auto_confirm` every "get ready" is acknowledged straight away, as
/// an unattended logging run would; without it the trip stalls at the first
/// prompt.
pub fn simulate(
    segments: Vec<Segment>,
    fixes: &[Fix],
    config: &ProximityConfig,
    auto_confirm: bool,
) -> Result<SimulationReport> {
    let mut nav = NavigationController::new(*config);
    nav.start(segments)?;

    let mut report = SimulationReport::default();
    for (seq, fix) in fixes.iter().enumerate() {
        let active = nav.active_index();
        match nav.on_location(fix) {
            Ok(classification) => {
                if classification == Classification::GetReady && auto_confirm {
                    nav.confirm();
                }
                report.observe(TelemetryRecord::capture(
                    seq as u64,
                    fix,
                    classification,
                    active,
                    &nav,
                ));
            }
            Err(e) => {
                debug!("Fix {} rejected during replay: {}", seq, e);
                report.reject(seq);
            }
        }
    }

    debug!(
        "Replayed {} fixes: get ready at {:?}, finished at {:?}",
        fixes.len(),
        report.get_ready_at,
        report.finished_at
    );
    Ok(report)
}
