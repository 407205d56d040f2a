// =====================================================================================
// File: core-scoring/src/geo.rs
// Description: Geospatial helpers for GPS deviation checks
// =====================================================================================

use crate::types::GpsCoordinate;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates in kilometers
pub fn haversine_distance_km(a: GpsCoordinate, b: GpsCoordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lon1 = a.lon.to_radians();
    let lat2 = b.lat.to_radians();
    let lon2 = b.lon.to_radians();

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance between declared asset location and submission location, when both
/// are present
pub fn gps_deviation(
    declared: Option<GpsCoordinate>,
    submission: Option<GpsCoordinate>,
) -> Option<f64> {
    match (declared, submission) {
        (Some(a), Some(b)) => Some(haversine_distance_km(a, b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_points_zero_distance() {
        let point = GpsCoordinate { lat: 17.385, lon: 78.4867 };
        assert!(haversine_distance_km(point, point) < 1e-9);
    }

    #[test]
    fn test_known_distance_hyderabad_to_warangal() {
        let hyderabad = GpsCoordinate { lat: 17.385, lon: 78.4867 };
        let warangal = GpsCoordinate { lat: 17.9689, lon: 79.5941 };
        let distance = haversine_distance_km(hyderabad, warangal);
        assert!((distance - 134.0).abs() < 5.0, "got {distance}");
    }

    #[test]
    fn test_deviation_requires_both_points() {
        let point = GpsCoordinate { lat: 0.0, lon: 0.0 };
        assert!(gps_deviation(Some(point), None).is_none());
        assert!(gps_deviation(None, Some(point)).is_none());
        assert!(gps_deviation(Some(point), Some(point)).is_some());
    }
}
