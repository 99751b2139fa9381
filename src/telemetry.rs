//! Per-fix telemetry: what the engine saw and decided for every fix, kept
//! for replaying and re-tuning against recorded trips.

use crate::error::Result;
use crate::nav::{Classification, Distances, Fix, NavigationController};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Position of the fix in the stream it came from
    pub seq: u64,
    pub recorded_at: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: f32,
    pub distance_to_before_m: Option<f64>,
    pub distance_to_target_m: Option<f64>,
    pub classification: Classification,
    /// Segment that was active when the fix arrived
    pub active_index: Option<usize>,
    pub ready: bool,
    pub finished: bool,
}

impl TelemetryRecord {
    /// Capture a fix together with the controller state right after it was
    /// processed. `active_index` is the segment the fix was checked against,
    /// which differs from the controller's when the fix advanced it.
    /// Distances are measured from this fix, whether or not it was classified.
    pub fn capture(
        seq: u64,
        fix: &Fix,
        classification: Classification,
        active_index: Option<usize>,
        nav: &NavigationController,
    ) -> Self {
        let distances = active_index
            .and_then(|index| nav.segments().get(index))
            .filter(|_| fix.location.is_valid())
            .map(|segment| Distances {
                to_before_m: fix.location.distance_to(&segment.before_location()),
                to_target_m: fix.location.distance_to(&segment.target_location()),
            });
        Self {
            seq,
            recorded_at: i64::try_from(fix.timestamp_ms)
                .ok()
                .and_then(DateTime::from_timestamp_millis),
            latitude: fix.location.lat,
            longitude: fix.location.lon,
            speed_mps: fix.speed_mps,
            distance_to_before_m: distances.map(|d| d.to_before_m),
            distance_to_target_m: distances.map(|d| d.to_target_m),
            classification,
            active_index,
            ready: nav.is_ready(),
            finished: nav.is_finished(),
        }
    }
}

/// Writes telemetry as JSON lines.
pub struct TelemetryWriter<W: Write> {
    writer: W,
}

impl TelemetryWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TelemetryWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write(&mut self, record: &TelemetryRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
