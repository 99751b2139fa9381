//! Recorded-trip replay: reading and writing trip recordings, trip plans,
//! and re-running the engine over them to see when each alert fires.

pub mod recording;
pub mod simulation;

pub use crate::telemetry::{TelemetryRecord, TelemetryWriter};
pub use recording::{RecordedFix, RecordedTrip, RecordingHeader, RecordingWriter};
pub use simulation::{simulate, Alert, Expectation, Mismatch, SimulationReport};

use crate::error::Result;
use crate::nav::Segment;
use std::path::Path;
use tracing::info;

/// Load a multi-leg trip plan: a JSON array of segments.
pub fn load_plan(path: &Path) -> Result<Vec<Segment>> {
    let contents = std::fs::read_to_string(path)?;
    let segments: Vec<Segment> = serde_json::from_str(&contents)?;
    info!("Loaded trip plan with {} segment(s)", segments.len());
    Ok(segments)
}
