use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }

    /// Finite and inside the latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Point reached by travelling `distance_m` along `bearing_deg`
    /// (clockwise from north) on a sphere.
    pub fn destination(&self, bearing_deg: f64, distance_m: f64) -> GeoPoint {
        let angular = distance_m / EARTH_RADIUS_M;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.lat.to_radians();
        let lon1 = self.lon.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        GeoPoint::new(lat2.to_degrees(), lon2.to_degrees())
    }
}

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_to_self() {
        let p = GeoPoint::new(28.0587, -82.4139);
        assert_eq!(p.distance_to(&p), 0.0);
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.9).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn destination_round_trips_distance() {
        let start = GeoPoint::new(28.0587, -82.4139);
        for bearing in [0.0, 45.0, 180.0, 270.0] {
            let end = start.destination(bearing, 37.5);
            assert!((start.distance_to(&end) - 37.5).abs() < 1e-6);
        }
    }

    #[test]
    fn validity() {
        assert!(GeoPoint::new(45.0, 170.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::INFINITY).is_valid());
    }
}
