//! Proximity detection around the stop before the rider's target.
//!
//! Raw distance is useless near a stop: GPS noise makes the reported
//! distance bounce across any single threshold. The detector instead walks a
//! ladder of distance bands around the before stop. A departure only counts
//! once an approach has been seen, and instantaneous speed separates a
//! vehicle that stopped and is pulling away from one driving straight past.

use crate::config::ProximityConfig;
use crate::error::NavError;
use crate::geo::GeoPoint;
use crate::nav::Segment;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result of classifying one fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    NoEvent,
    GetReady,
    StopReached,
}

/// Position on the stop-reached ladder.
///
/// Apart from `OutsideRange`, each variant is also a crossing that can be
/// recorded at most once per segment. Approach bands can be seen out of
/// order (a first fix may already be inside 50 m), so the detector keeps
/// the set of recorded crossings alongside the most recent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LadderState {
    OutsideRange,
    ApproachOuter,
    ApproachMid,
    ApproachInner,
    DepartInner,
    DepartMid,
}

impl LadderState {
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of ladder crossings recorded for the active segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crossings(u8);

impl Crossings {
    pub fn contains(self, state: LadderState) -> bool {
        self.0 & state.bit() != 0
    }

    fn insert(&mut self, state: LadderState) {
        self.0 |= state.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Band a distance falls in. Band edges are exclusive, so a fix exactly on
/// an edge belongs to no band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Inner,
    Mid,
    Outer,
}

impl Band {
    fn of(distance_m: f64, config: &ProximityConfig) -> Option<Band> {
        if distance_m < config.inner_band_m {
            Some(Band::Inner)
        } else if distance_m > config.inner_band_m && distance_m < config.mid_band_m {
            Some(Band::Mid)
        } else if distance_m > config.mid_band_m && distance_m < config.outer_band_m {
            Some(Band::Outer)
        } else {
            None
        }
    }
}

/// Distances measured for the latest fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distances {
    pub to_before_m: f64,
    pub to_target_m: f64,
}

/// The ladder's transition function. Returns the crossing to record and the
/// outcome, or `None` when no rule applies to this fix.
fn transition(
    crossings: Crossings,
    distance_m: f64,
    speed_mps: f32,
    fast_pass_allowed: bool,
    config: &ProximityConfig,
) -> Option<(LadderState, Classification)> {
    use Classification::*;
    use LadderState::*;

    match Band::of(distance_m, config)? {
        Band::Outer if !crossings.contains(ApproachOuter) => Some((ApproachOuter, NoEvent)),
        Band::Mid if !crossings.contains(ApproachMid) => Some((ApproachMid, NoEvent)),
        Band::Inner if !crossings.contains(ApproachInner) => {
            // Straight into the inner band at speed: the vehicle is not stopping.
            let outcome = if speed_mps > config.pass_through_speed_mps && fast_pass_allowed {
                StopReached
            } else {
                NoEvent
            };
            Some((ApproachInner, outcome))
        }
        Band::Inner if !crossings.contains(DepartInner) => {
            // Between the dwell and pass-through speeds nothing is decided.
            let outcome = if speed_mps < config.dwell_speed_mps {
                NoEvent
            } else if speed_mps > config.pass_through_speed_mps {
                StopReached
            } else {
                NoEvent
            };
            Some((DepartInner, outcome))
        }
        Band::Mid
            if !crossings.contains(DepartMid)
                && (crossings.contains(DepartInner) || crossings.contains(ApproachInner))
                && distance_m > config.inner_band_m + config.departure_margin_m =>
        {
            Some((DepartMid, StopReached))
        }
        _ => None,
    }
}

/// Hysteresis classifier for one segment. A fresh detector is built every
/// time a segment becomes active; it is never reused across segments.
#[derive(Debug, Clone)]
pub struct ProximityDetector {
    config: ProximityConfig,
    get_ready_radius_m: f64,
    crossings: Crossings,
    state: LadderState,
    ready_fired: bool,
    confirmed_departed: bool,
    last_distances: Option<Distances>,
}

impl ProximityDetector {
    pub fn new(config: ProximityConfig) -> Self {
        Self {
            get_ready_radius_m: config.get_ready_radius_m,
            config,
            crossings: Crossings::default(),
            state: LadderState::OutsideRange,
            ready_fired: false,
            confirmed_departed: false,
            last_distances: None,
        }
    }

    /// Detector for a segment, honouring its alert radius override.
    pub fn for_segment(segment: &Segment, config: &ProximityConfig) -> Self {
        let mut detector = Self::new(*config);
        if let Some(radius) = segment.alert_radius() {
            detector.get_ready_radius_m = radius;
        }
        detector
    }

    pub fn state(&self) -> LadderState {
        self.state
    }

    pub fn crossings(&self) -> Crossings {
        self.crossings
    }

    pub fn ready_fired(&self) -> bool {
        self.ready_fired
    }

    pub fn confirmed_departed(&self) -> bool {
        self.confirmed_departed
    }

    pub fn last_distances(&self) -> Option<Distances> {
        self.last_distances
    }

    /// Classify one fix against the segment's reference stops.
    ///
    /// The get-ready gate is checked first and, when it fires, the ladder is
    /// not evaluated for that fix. Once `StopReached` has been returned the
    /// detector is spent and every further call yields `NoEvent`.
    pub fn classify(
        &mut self,
        current: GeoPoint,
        before: GeoPoint,
        target: GeoPoint,
        speed_mps: f32,
    ) -> Result<Classification, NavError> {
        if !before.is_valid() {
            return Err(NavError::InvalidSegment(format!(
                "before location {:?} is not a valid coordinate",
                before
            )));
        }
        if !target.is_valid() {
            return Err(NavError::InvalidSegment(format!(
                "target location {:?} is not a valid coordinate",
                target
            )));
        }
        if !current.is_valid() {
            return Err(NavError::InvalidFix(format!(
                "coordinate ({}, {}) out of range",
                current.lat, current.lon
            )));
        }
        if !speed_mps.is_finite() || speed_mps < 0.0 {
            return Err(NavError::InvalidFix(format!(
                "speed {} is not a valid speed",
                speed_mps
            )));
        }

        let distances = Distances {
            to_before_m: current.distance_to(&before),
            to_target_m: current.distance_to(&target),
        };
        self.last_distances = Some(distances);

        if self.confirmed_departed {
            debug!("Detector already fired stop reached, ignoring fix");
            return Ok(Classification::NoEvent);
        }

        if distances.to_before_m < self.get_ready_radius_m && !self.ready_fired {
            self.ready_fired = true;
            debug!(
                "Get ready: {:.1}m from before stop (radius {:.0}m)",
                distances.to_before_m, self.get_ready_radius_m
            );
            return Ok(Classification::GetReady);
        }

        let fast_pass_allowed = self
            .config
            .fast_pass_max_leg_m
            .map_or(true, |max_leg| before.distance_to(&target) < max_leg);

        let outcome = match transition(
            self.crossings,
            distances.to_before_m,
            speed_mps,
            fast_pass_allowed,
            &self.config,
        ) {
            Some((crossing, outcome)) => {
                self.crossings.insert(crossing);
                self.state = crossing;
                debug!(
                    "Crossing {:?} at {:.1}m, speed {:.1} m/s -> {:?}",
                    crossing, distances.to_before_m, speed_mps, outcome
                );
                outcome
            }
            None => Classification::NoEvent,
        };

        if outcome == Classification::StopReached {
            self.confirmed_departed = true;
        }
        Ok(outcome)
    }
}
