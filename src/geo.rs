//! Geographic fixes and the great-circle math the motion aggregator builds on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A single timestamped location reading, immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub altitude_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Great-circle distance in meters between two fixes (haversine).
pub fn haversine_distance_m(a: &GeoFix, b: &GeoFix) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Interval speed in km/h. Non-positive elapsed time yields 0 so clock
/// skew between fixes can never produce a negative or infinite speed.
pub fn speed_kmh(distance_m: f64, elapsed_ms: i64) -> f64 {
    if elapsed_ms <= 0 {
        return 0.0;
    }
    (distance_m / 1000.0) / (elapsed_ms as f64 / 3_600_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(latitude: f64, longitude: f64) -> GeoFix {
        GeoFix {
            latitude,
            longitude,
            accuracy_m: 5.0,
            altitude_m: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = fix(35.6812, 139.7671);
        assert_eq!(haversine_distance_m(&a, &a), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = fix(35.6812, 139.7671);
        let b = fix(35.6896, 139.7006);
        let ab = haversine_distance_m(&a, &b);
        let ba = haversine_distance_m(&b, &a);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn one_milli_degree_of_latitude_is_about_111_meters() {
        let a = fix(35.0, 139.0);
        let b = fix(35.001, 139.0);
        let d = haversine_distance_m(&a, &b);
        assert!((d - 111.2).abs() < 1.0, "got {d}");
    }

    #[test]
    fn speed_from_interval() {
        // 10 m in 3.6 s is 10 km/h.
        let v = speed_kmh(10.0, 3_600);
        assert!((v - 10.0).abs() < 1e-9);
    }

    #[test]
    fn non_positive_elapsed_yields_zero_speed() {
        assert_eq!(speed_kmh(25.0, 0), 0.0);
        assert_eq!(speed_kmh(25.0, -1_000), 0.0);
    }
}
