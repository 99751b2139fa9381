//! Recorded trips: GPS fixes logged near the before stop together with the
//! alert flags the live engine showed at the time.
//!
//! A recording is a headerless CSV file. The first line names the trip and
//! its two stops, every following line is one fix.

use crate::config::RecordingConfig;
use crate::error::{PullcordError, Result};
use crate::geo::GeoPoint;
use crate::nav::{Fix, Segment};
use crate::replay::simulation::Expectation;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// First line of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingHeader {
    pub trip_id: String,
    pub destination_stop_id: String,
    pub destination_lat: f64,
    pub destination_lon: f64,
    pub before_stop_id: String,
    pub before_lat: f64,
    pub before_lon: f64,
}

impl RecordingHeader {
    pub fn destination(&self) -> GeoPoint {
        GeoPoint::new(self.destination_lat, self.destination_lon)
    }

    pub fn before(&self) -> GeoPoint {
        GeoPoint::new(self.before_lat, self.before_lon)
    }
}

/// One logged fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFix {
    pub id: u64,
    /// "get ready" flag after this fix was processed
    pub get_ready: bool,
    /// Trip-finished flag after this fix was processed
    pub finished: bool,
    /// Monotonic receiver clock, when the device provided one
    pub elapsed_nanos: Option<u64>,
    /// Wall-clock time of the fix (ms since epoch)
    pub time_ms: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed_mps: f32,
    pub bearing: f32,
    pub accuracy: f32,
    pub satellites: u32,
    pub provider: String,
}

impl RecordedFix {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn to_fix(&self) -> Fix {
        Fix::new(self.latitude, self.longitude, self.speed_mps, self.time_ms)
    }
}

/// A parsed recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTrip {
    header: RecordingHeader,
    fixes: Vec<RecordedFix>,
}

impl RecordedTrip {
    pub fn new(header: RecordingHeader, fixes: Vec<RecordedFix>) -> Self {
        Self { header, fixes }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let trip = Self::from_reader(file)?;
        info!(
            "Loaded recording of trip {} from {} ({} fixes)",
            trip.header.trip_id,
            path.display(),
            trip.fixes.len()
        );
        Ok(trip)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut header: Option<RecordingHeader> = None;
        let mut fixes = Vec::new();

        for (index, result) in rdr.records().enumerate() {
            let record = result?;
            let line = record
                .position()
                .map_or(index as u64 + 1, |position| position.line());

            if header.is_none() {
                let parsed = record
                    .deserialize::<RecordingHeader>(None)
                    .map_err(|e| malformed(line, "header", e))?;
                header = Some(parsed);
                continue;
            }

            let fix = record
                .deserialize::<RecordedFix>(None)
                .map_err(|e| malformed(line, "fix", e))?;
            fixes.push(fix);
        }

        let header = header.ok_or_else(|| PullcordError::Recording {
            line: 0,
            reason: "recording is empty".to_string(),
        })?;
        debug!("Parsed {} fixes for trip {}", fixes.len(), header.trip_id);

        Ok(Self { header, fixes })
    }

    pub fn header(&self) -> &RecordingHeader {
        &self.header
    }

    pub fn fixes(&self) -> &[RecordedFix] {
        &self.fixes
    }

    /// The fixes in the form the engine consumes.
    pub fn nav_fixes(&self) -> Vec<Fix> {
        self.fixes.iter().map(RecordedFix::to_fix).collect()
    }

    /// The single leg this recording covers.
    pub fn segment(&self) -> Result<Segment> {
        Ok(Segment::new(self.header.before(), self.header.destination())?)
    }

    /// Index of the first fix recorded with the "get ready" flag set.
    pub fn expected_get_ready(&self) -> Option<usize> {
        self.fixes.iter().position(|f| f.get_ready)
    }

    /// Index of the first fix recorded with the trip finished.
    pub fn expected_finished(&self) -> Option<usize> {
        self.fixes.iter().position(|f| f.finished)
    }

    pub fn expectation(&self) -> Expectation {
        Expectation {
            get_ready: self.expected_get_ready(),
            finished: self.expected_finished(),
        }
    }

    /// Time between consecutive fixes in milliseconds, starting with 0.
    /// Uses the monotonic clock when every fix carries it, wall time otherwise.
    pub fn intervals_ms(&self) -> Vec<u64> {
        let monotonic = self.fixes.iter().all(|f| f.elapsed_nanos.is_some());

        let mut intervals = Vec::with_capacity(self.fixes.len());
        for (i, fix) in self.fixes.iter().enumerate() {
            if i == 0 {
                intervals.push(0);
                continue;
            }
            let prev = &self.fixes[i - 1];
            let delta = match (monotonic, prev.elapsed_nanos, fix.elapsed_nanos) {
                (true, Some(a), Some(b)) => b.saturating_sub(a) / 1_000_000,
                _ => fix.time_ms.saturating_sub(prev.time_ms),
            };
            intervals.push(delta);
        }
        intervals
    }
}

fn malformed(line: u64, what: &str, e: csv::Error) -> PullcordError {
    PullcordError::Recording {
        line,
        reason: format!("malformed {}: {}", what, e),
    }
}

/// Writes fixes in the recording format, keeping only those close enough to
/// the before stop to matter for the ladder.
pub struct RecordingWriter<W: Write> {
    writer: csv::Writer<W>,
    before: GeoPoint,
    radius_m: f64,
    next_id: u64,
    skipped: u64,
}

impl RecordingWriter<File> {
    pub fn create(path: &Path, header: &RecordingHeader, config: &RecordingConfig) -> Result<Self> {
        let file = File::create(path)?;
        info!("Recording fixes to {}", path.display());
        Self::new(file, header, config)
    }
}

impl<W: Write> RecordingWriter<W> {
    pub fn new(inner: W, header: &RecordingHeader, config: &RecordingConfig) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(inner);
        writer.serialize(header)?;

        Ok(Self {
            writer,
            before: header.before(),
            radius_m: config.recording_radius_m,
            next_id: 0,
            skipped: 0,
        })
    }

    /// Write `sample` with the engine's flags after it was processed.
    /// Returns whether the fix was close enough to be written.
    pub fn record(&mut self, sample: &RecordedFix, get_ready: bool, finished: bool) -> Result<bool> {
        let location = sample.location();
        if !location.is_valid() || location.distance_to(&self.before) > self.radius_m {
            self.skipped += 1;
            return Ok(false);
        }

        let row = RecordedFix {
            id: self.next_id,
            get_ready,
            finished,
            ..sample.clone()
        };
        self.writer.serialize(&row)?;
        self.next_id += 1;
        Ok(true)
    }

    pub fn written(&self) -> u64 {
        self.next_id
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| PullcordError::Io(e.into_error()))
    }
}
