use crate::error::NavError;
use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};

/// One leg of a trip.
///
/// `before_location` is the stop preceding the leg's target; the ladder
/// measures everything against it. `target_location` is where the leg drops
/// the rider (the rider's destination for the last leg).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    before_location: GeoPoint,
    target_location: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alert_radius: Option<f64>,
}

impl Segment {
    pub fn new(before_location: GeoPoint, target_location: GeoPoint) -> Result<Self, NavError> {
        SegmentBuilder::default()
            .before(before_location)
            .target(target_location)
            .build()
    }

    pub fn builder() -> SegmentBuilder {
        SegmentBuilder::default()
    }

    pub fn before_location(&self) -> GeoPoint {
        self.before_location
    }

    pub fn target_location(&self) -> GeoPoint {
        self.target_location
    }

    pub fn origin_location(&self) -> Option<GeoPoint> {
        self.origin_location
    }

    pub fn alert_radius(&self) -> Option<f64> {
        self.alert_radius
    }

    /// Straight-line distance between the before stop and the target stop.
    pub fn leg_length_m(&self) -> f64 {
        self.before_location.distance_to(&self.target_location)
    }

    /// Check stops and radius. Deserialized segments bypass the builder and
    /// are only checked here.
    pub fn validate(&self) -> Result<(), NavError> {
        if !self.before_location.is_valid() {
            return Err(NavError::InvalidSegment(format!(
                "before location {:?} is not a valid coordinate",
                self.before_location
            )));
        }
        if !self.target_location.is_valid() {
            return Err(NavError::InvalidSegment(format!(
                "target location {:?} is not a valid coordinate",
                self.target_location
            )));
        }
        if let Some(origin) = self.origin_location {
            if !origin.is_valid() {
                return Err(NavError::InvalidSegment(format!(
                    "origin location {:?} is not a valid coordinate",
                    origin
                )));
            }
        }
        if let Some(radius) = self.alert_radius {
            if !(radius.is_finite() && radius > 0.0) {
                return Err(NavError::InvalidSegment(format!(
                    "alert radius {} must be a positive distance",
                    radius
                )));
            }
        }
        Ok(())
    }
}

/// Collects segment fields as they are resolved; `build` fails if either
/// reference stop is still missing.
#[derive(Debug, Clone, Default)]
pub struct SegmentBuilder {
    before_location: Option<GeoPoint>,
    target_location: Option<GeoPoint>,
    origin_location: Option<GeoPoint>,
    alert_radius: Option<f64>,
}

impl SegmentBuilder {
    pub fn before(mut self, location: GeoPoint) -> Self {
        self.before_location = Some(location);
        self
    }

    pub fn target(mut self, location: GeoPoint) -> Self {
        self.target_location = Some(location);
        self
    }

    pub fn origin(mut self, location: GeoPoint) -> Self {
        self.origin_location = Some(location);
        self
    }

    pub fn alert_radius(mut self, meters: f64) -> Self {
        self.alert_radius = Some(meters);
        self
    }

    pub fn build(self) -> Result<Segment, NavError> {
        let before_location = self
            .before_location
            .ok_or_else(|| NavError::InvalidSegment("before location is not set".to_string()))?;
        let target_location = self
            .target_location
            .ok_or_else(|| NavError::InvalidSegment("target location is not set".to_string()))?;

        let segment = Segment {
            before_location,
            target_location,
            origin_location: self.origin_location,
            alert_radius: self.alert_radius,
        };
        segment.validate()?;
        Ok(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEFORE: GeoPoint = GeoPoint::new(28.0587, -82.4139);
    const TARGET: GeoPoint = GeoPoint::new(28.0612, -82.4139);

    #[test]
    fn builder_requires_both_stops() {
        let missing_target = Segment::builder().before(BEFORE).build();
        assert!(matches!(missing_target, Err(NavError::InvalidSegment(_))));

        let missing_before = Segment::builder().target(TARGET).build();
        assert!(matches!(missing_before, Err(NavError::InvalidSegment(_))));
    }

    #[test]
    fn builder_keeps_optional_fields() {
        let origin = GeoPoint::new(28.05, -82.41);
        let segment = Segment::builder()
            .before(BEFORE)
            .target(TARGET)
            .origin(origin)
            .alert_radius(150.0)
            .build()
            .unwrap();

        assert_eq!(segment.origin_location(), Some(origin));
        assert_eq!(segment.alert_radius(), Some(150.0));
        assert!((segment.leg_length_m() - 278.0).abs() < 1.0);
    }

    #[test]
    fn rejects_nan_and_bad_radius() {
        assert!(Segment::new(GeoPoint::new(f64::NAN, 0.0), TARGET).is_err());
        assert!(Segment::builder()
            .before(BEFORE)
            .target(TARGET)
            .alert_radius(-5.0)
            .build()
            .is_err());
    }

    #[test]
    fn deserialized_segments_are_checked_by_validate() {
        let json = r#"{"before_location":{"lat":95.0,"lon":0.0},"target_location":{"lat":1.0,"lon":1.0}}"#;
        let segment: Segment = serde_json::from_str(json).unwrap();
        assert!(matches!(segment.validate(), Err(NavError::InvalidSegment(_))));
    }
}
