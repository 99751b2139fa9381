use crate::error::NavError;
use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};

/// One location sample as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub location: GeoPoint,
    /// Instantaneous speed reported with the fix (m/s)
    pub speed_mps: f32,
    /// Fix time (milliseconds since the Unix epoch)
    pub timestamp_ms: u64,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64, speed_mps: f32, timestamp_ms: u64) -> Self {
        Self {
            location: GeoPoint::new(latitude, longitude),
            speed_mps,
            timestamp_ms,
        }
    }

    /// Coordinates must be finite and in range, speed finite and non-negative.
    pub fn validate(&self) -> Result<(), NavError> {
        if !self.location.is_valid() {
            return Err(NavError::InvalidFix(format!(
                "coordinate ({}, {}) out of range",
                self.location.lat, self.location.lon
            )));
        }
        if !self.speed_mps.is_finite() || self.speed_mps < 0.0 {
            return Err(NavError::InvalidFix(format!(
                "speed {} is not a valid speed",
                self.speed_mps
            )));
        }
        Ok(())
    }

    /// Same timestamp and same position.
    pub fn is_duplicate_of(&self, other: &Fix) -> bool {
        self.timestamp_ms == other.timestamp_ms && self.location == other.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_nan_and_negative_speed() {
        assert!(Fix::new(28.0, -82.0, 3.0, 0).validate().is_ok());
        assert!(matches!(
            Fix::new(f64::NAN, -82.0, 3.0, 0).validate(),
            Err(NavError::InvalidFix(_))
        ));
        assert!(Fix::new(28.0, -182.0, 3.0, 0).validate().is_err());
        assert!(Fix::new(28.0, -82.0, f32::NAN, 0).validate().is_err());
        assert!(Fix::new(28.0, -82.0, -1.0, 0).validate().is_err());
    }

    #[test]
    fn duplicates_need_time_and_position() {
        let a = Fix::new(28.0, -82.0, 3.0, 1000);
        assert!(a.is_duplicate_of(&Fix::new(28.0, -82.0, 9.0, 1000)));
        assert!(!a.is_duplicate_of(&Fix::new(28.0, -82.0, 3.0, 1001)));
        assert!(!a.is_duplicate_of(&Fix::new(28.0001, -82.0, 3.0, 1000)));
    }
}
