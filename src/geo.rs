//! Great-circle distance

use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate in decimal degrees.
///
/// Ranges are not validated; out-of-range values are the caller's problem and
/// simply flow through the formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Haversine distance in metres between two coordinates.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1.0 for antipodal points
    let c = 2.0 * h.min(1.0).sqrt().asin();
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        let p = Coordinate::new(52.3676, 4.9041);
        assert_eq!(distance(p, p), 0.0);
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            (Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.00045)),
            (Coordinate::new(52.3676, 4.9041), Coordinate::new(51.9244, 4.4777)),
            (Coordinate::new(-33.8688, 151.2093), Coordinate::new(40.7128, -74.0060)),
            (Coordinate::new(89.9, 10.0), Coordinate::new(-89.9, -170.0)),
        ];
        for (a, b) in pairs {
            let ab = distance(a, b);
            let ba = distance(b, a);
            assert!((ab - ba).abs() < 1e-6, "{} vs {}", ab, ba);
        }
    }

    #[test]
    fn test_small_equatorial_offset() {
        // 0.00045 degrees of longitude on the equator is just over 50 m
        let d = distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.00045));
        assert!((d - 50.04).abs() < 0.01, "got {}", d);

        let d = distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.0005));
        assert!((d - 55.6).abs() < 0.1, "got {}", d);
    }

    #[test]
    fn test_known_city_distance() {
        // Amsterdam Centraal to Rotterdam Centraal, roughly 58 km
        let d = distance(
            Coordinate::new(52.3791, 4.9003),
            Coordinate::new(51.9244, 4.4690),
        );
        assert!(d > 55_000.0 && d < 62_000.0, "got {}", d);
    }

    #[test]
    fn test_out_of_range_input_is_not_rejected() {
        let d = distance(Coordinate::new(120.0, 400.0), Coordinate::new(0.0, 0.0));
        assert!(d.is_finite());
    }
}
