use crate::config::ProximityConfig;
use crate::error::NavError;
use crate::nav::proximity::{Classification, Distances, LadderState, ProximityDetector};
use crate::nav::{Fix, Segment};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Where a controller is in its trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "segment")]
pub enum TripPhase {
    NotStarted,
    Navigating(usize),
    Finished,
}

/// Drives one trip: owns its segments, the detector for the active segment
/// and the two rider-facing flags.
///
/// The controller is synchronous and expects fixes one at a time, in the
/// order they were taken. It never spawns work of its own.
#[derive(Debug)]
pub struct NavigationController {
    config: ProximityConfig,
    segments: Vec<Segment>,
    active_index: usize,
    detector: Option<ProximityDetector>,
    ready: bool,
    finished: bool,
    awaiting_confirmation: bool,
    last_distances: Option<Distances>,
    dropped_fixes: u64,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new(ProximityConfig::default())
    }
}

impl NavigationController {
    pub fn new(config: ProximityConfig) -> Self {
        Self {
            config,
            segments: Vec::new(),
            active_index: 0,
            detector: None,
            ready: false,
            finished: false,
            awaiting_confirmation: false,
            last_distances: None,
            dropped_fixes: 0,
        }
    }

    /// Begin a trip at its first segment.
    ///
    /// The thresholds and every segment are checked before anything changes,
    /// so a trip with an unresolvable stop is never half-started.
    pub fn start(&mut self, segments: Vec<Segment>) -> Result<(), NavError> {
        if self.finished {
            return Err(NavError::AlreadyFinished);
        }
        self.config.validate()?;
        if segments.is_empty() {
            return Err(NavError::EmptyTrip);
        }
        for (index, segment) in segments.iter().enumerate() {
            segment.validate().map_err(|e| match e {
                NavError::InvalidSegment(reason) => {
                    NavError::InvalidSegment(format!("segment {}: {}", index, reason))
                }
                other => other,
            })?;
        }

        info!("Starting navigation with {} segment(s)", segments.len());
        self.detector = Some(ProximityDetector::for_segment(&segments[0], &self.config));
        self.segments = segments;
        self.active_index = 0;
        self.ready = false;
        self.awaiting_confirmation = false;
        self.last_distances = None;
        self.dropped_fixes = 0;
        Ok(())
    }

    /// Feed one fix.
    ///
    /// Returns `NoEvent` without classifying when the trip is finished or a
    /// "get ready" alert is waiting for the rider. An invalid fix is counted
    /// and returned as an error; the trip itself carries on.
    pub fn on_location(&mut self, fix: &Fix) -> Result<Classification, NavError> {
        if self.finished {
            return Ok(Classification::NoEvent);
        }
        let detector = self.detector.as_mut().ok_or(NavError::NotStarted)?;

        if let Err(e) = fix.validate() {
            self.dropped_fixes += 1;
            warn!("Dropping fix at {}: {}", fix.timestamp_ms, e);
            return Err(e);
        }

        if self.awaiting_confirmation {
            debug!("Awaiting rider confirmation, fix not classified");
            return Ok(Classification::NoEvent);
        }

        let segment = &self.segments[self.active_index];
        let classification = detector.classify(
            fix.location,
            segment.before_location(),
            segment.target_location(),
            fix.speed_mps,
        )?;
        self.last_distances = detector.last_distances();

        match classification {
            Classification::GetReady => {
                info!("Get ready (segment {})", self.active_index);
                self.ready = true;
                self.awaiting_confirmation = true;
            }
            Classification::StopReached => {
                info!("Stop reached (segment {})", self.active_index);
                self.advance();
            }
            Classification::NoEvent => {}
        }

        Ok(classification)
    }

    /// The rider acknowledged the last prompt. Calling this with nothing
    /// pending does nothing.
    pub fn confirm(&mut self) {
        if self.awaiting_confirmation {
            debug!("Rider confirmed, resuming classification");
            self.awaiting_confirmation = false;
        }
    }

    /// Move on as if the active segment's stop had been reached, e.g. when the
    /// rider confirms arrival early. Finishes the trip on the last segment and
    /// does nothing once finished.
    pub fn skip_segment(&mut self) {
        if self.finished || self.detector.is_none() {
            return;
        }
        info!("Skipping segment {}", self.active_index);
        self.awaiting_confirmation = false;
        self.advance();
    }

    /// Abort the trip. A finished trip stays finished.
    pub fn stop(&mut self) {
        info!("Stopping navigation");
        self.detector = None;
        self.awaiting_confirmation = false;
        if !self.finished {
            self.segments.clear();
            self.active_index = 0;
            self.ready = false;
            self.last_distances = None;
        }
    }

    fn advance(&mut self) {
        if self.active_index + 1 < self.segments.len() {
            self.active_index += 1;
            self.detector = Some(ProximityDetector::for_segment(
                &self.segments[self.active_index],
                &self.config,
            ));
            self.ready = false;
            info!(
                "Navigating segment {} of {}",
                self.active_index + 1,
                self.segments.len()
            );
        } else {
            info!("Trip finished");
            self.finished = true;
            self.detector = None;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.awaiting_confirmation
    }

    pub fn phase(&self) -> TripPhase {
        if self.finished {
            TripPhase::Finished
        } else if self.detector.is_some() {
            TripPhase::Navigating(self.active_index)
        } else {
            TripPhase::NotStarted
        }
    }

    /// Index of the active segment, or `None` before the trip starts. Stays
    /// on the last segment once the trip is finished.
    pub fn active_index(&self) -> Option<usize> {
        match self.phase() {
            TripPhase::NotStarted => None,
            _ => Some(self.active_index),
        }
    }

    pub fn active_segment(&self) -> Option<&Segment> {
        self.detector
            .as_ref()
            .and_then(|_| self.segments.get(self.active_index))
    }

    /// The trip's segments; empty before `start` and after `stop` on an
    /// unfinished trip.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn ladder_state(&self) -> Option<LadderState> {
        self.detector.as_ref().map(|d| d.state())
    }

    /// Distances measured for the most recent classified fix.
    pub fn last_distances(&self) -> Option<Distances> {
        self.last_distances
    }

    pub fn dropped_fixes(&self) -> u64 {
        self.dropped_fixes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    const STOP_A: GeoPoint = GeoPoint::new(28.0587, -82.4139);
    const STOP_B: GeoPoint = GeoPoint::new(28.0632, -82.4139);
    const STOP_C: GeoPoint = GeoPoint::new(28.0677, -82.4139);

    fn two_legs() -> Vec<Segment> {
        vec![
            Segment::new(STOP_A, STOP_B).unwrap(),
            Segment::new(STOP_B, STOP_C).unwrap(),
        ]
    }

    fn fix_near(stop: GeoPoint, meters: f64, speed: f32, t: u64) -> Fix {
        let p = stop.destination(180.0, meters);
        Fix::new(p.lat, p.lon, speed, t)
    }

    #[test]
    fn on_location_before_start_fails() {
        let mut nav = NavigationController::default();
        assert_eq!(
            nav.on_location(&fix_near(STOP_A, 10.0, 1.0, 0)),
            Err(NavError::NotStarted)
        );
        assert_eq!(nav.phase(), TripPhase::NotStarted);
        assert_eq!(nav.active_index(), None);
    }

    #[test]
    fn start_rejects_empty_trip() {
        let mut nav = NavigationController::default();
        assert_eq!(nav.start(Vec::new()), Err(NavError::EmptyTrip));
    }

    #[test]
    fn start_rejects_invalid_thresholds() {
        let mut nav = NavigationController::new(ProximityConfig {
            mid_band_m: 150.0,
            ..Default::default()
        });
        assert!(matches!(
            nav.start(two_legs()),
            Err(NavError::InvalidConfig(_))
        ));
        assert_eq!(nav.phase(), TripPhase::NotStarted);

        let mut nav = NavigationController::new(ProximityConfig {
            departure_margin_m: f64::NAN,
            ..Default::default()
        });
        assert!(matches!(
            nav.start(two_legs()),
            Err(NavError::InvalidConfig(_))
        ));
    }

    #[test]
    fn start_rejects_bad_segment_without_starting() {
        let bad: Segment = serde_json::from_str(
            r#"{"before_location":{"lat":28.0,"lon":-82.0},"target_location":{"lat":-100.0,"lon":0.0}}"#,
        )
        .unwrap();
        let mut nav = NavigationController::default();
        let err = nav
            .start(vec![Segment::new(STOP_A, STOP_B).unwrap(), bad])
            .unwrap_err();
        match err {
            NavError::InvalidSegment(reason) => assert!(reason.starts_with("segment 1")),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(nav.phase(), TripPhase::NotStarted);
    }

    #[test]
    fn get_ready_waits_for_confirmation() {
        let mut nav = NavigationController::default();
        nav.start(two_legs()).unwrap();

        assert_eq!(
            nav.on_location(&fix_near(STOP_A, 200.0, 8.0, 1)).unwrap(),
            Classification::GetReady
        );
        assert!(nav.is_ready());
        assert!(nav.is_awaiting_confirmation());

        // Would be a fast pass-through, but nothing is classified until confirmed.
        assert_eq!(
            nav.on_location(&fix_near(STOP_A, 10.0, 20.0, 2)).unwrap(),
            Classification::NoEvent
        );
        assert_eq!(nav.active_index(), Some(0));

        nav.confirm();
        assert!(!nav.is_awaiting_confirmation());
        assert_eq!(
            nav.on_location(&fix_near(STOP_A, 10.0, 20.0, 3)).unwrap(),
            Classification::StopReached
        );
        assert_eq!(nav.active_index(), Some(1));
        assert!(!nav.is_ready());
        assert!(!nav.is_finished());
    }

    #[test]
    fn confirm_without_prompt_is_noop() {
        let mut nav = NavigationController::default();
        nav.confirm();
        nav.start(two_legs()).unwrap();
        nav.confirm();
        nav.confirm();
        assert!(!nav.is_awaiting_confirmation());
        assert_eq!(nav.phase(), TripPhase::Navigating(0));
    }

    #[test]
    fn last_stop_finishes_trip() {
        let mut nav = NavigationController::default();
        nav.start(vec![Segment::new(STOP_A, STOP_B).unwrap()]).unwrap();
        nav.on_location(&fix_near(STOP_A, 200.0, 8.0, 1)).unwrap();
        nav.confirm();
        nav.on_location(&fix_near(STOP_A, 10.0, 20.0, 2)).unwrap();

        assert!(nav.is_finished());
        assert!(nav.is_ready());
        assert_eq!(nav.phase(), TripPhase::Finished);
        assert_eq!(nav.active_index(), Some(0));

        assert_eq!(
            nav.on_location(&fix_near(STOP_A, 200.0, 8.0, 3)).unwrap(),
            Classification::NoEvent
        );
        assert!(nav.is_finished());
        assert_eq!(nav.start(two_legs()), Err(NavError::AlreadyFinished));
    }

    #[test]
    fn skip_segment_advances_and_finishes() {
        let mut nav = NavigationController::default();
        nav.start(two_legs()).unwrap();
        nav.on_location(&fix_near(STOP_A, 200.0, 8.0, 1)).unwrap();
        assert!(nav.is_awaiting_confirmation());

        nav.skip_segment();
        assert_eq!(nav.active_index(), Some(1));
        assert!(!nav.is_ready());
        assert!(!nav.is_awaiting_confirmation());
        assert_eq!(nav.ladder_state(), Some(LadderState::OutsideRange));

        nav.skip_segment();
        assert!(nav.is_finished());

        nav.skip_segment();
        assert!(nav.is_finished());
        assert_eq!(nav.active_index(), Some(1));
    }

    #[test]
    fn invalid_fix_is_dropped_without_state_change() {
        let mut nav = NavigationController::default();
        nav.start(two_legs()).unwrap();
        let bad = Fix::new(f64::NAN, -82.4, 5.0, 1);
        assert!(matches!(nav.on_location(&bad), Err(NavError::InvalidFix(_))));
        assert!(matches!(nav.on_location(&bad), Err(NavError::InvalidFix(_))));
        assert_eq!(nav.dropped_fixes(), 2);
        assert_eq!(nav.phase(), TripPhase::Navigating(0));

        assert_eq!(
            nav.on_location(&fix_near(STOP_A, 200.0, 8.0, 2)).unwrap(),
            Classification::GetReady
        );
    }

    #[test]
    fn stop_returns_to_not_started() {
        let mut nav = NavigationController::default();
        nav.start(two_legs()).unwrap();
        nav.stop();
        assert_eq!(nav.phase(), TripPhase::NotStarted);
        assert_eq!(
            nav.on_location(&fix_near(STOP_A, 10.0, 1.0, 0)),
            Err(NavError::NotStarted)
        );
        nav.start(two_legs()).unwrap();
        assert_eq!(nav.phase(), TripPhase::Navigating(0));
    }

    #[test]
    fn last_distances_follow_classified_fixes() {
        let mut nav = NavigationController::default();
        nav.start(two_legs()).unwrap();
        nav.on_location(&fix_near(STOP_A, 400.0, 8.0, 1)).unwrap();
        let d = nav.last_distances().unwrap();
        assert!((d.to_before_m - 400.0).abs() < 1e-6);
    }
}
