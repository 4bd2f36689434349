//! Great-circle distance helpers.

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two WGS84 coordinates, in meters.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Clamp guards against rounding pushing `a` just past 1.0 for antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(haversine_meters(48.8566, 2.3522, 48.8566, 2.3522), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // Paris to London, roughly 343.5 km.
        let d = haversine_meters(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((d - 343_500.0).abs() < 1_500.0, "got {d}");
    }

    #[test]
    fn test_one_millidegree_latitude() {
        let d = haversine_meters(0.0, 0.0, 0.001, 0.0);
        assert!((d - 111.2).abs() < 0.5, "got {d}");
    }

    proptest! {
        #[test]
        fn prop_symmetric_and_bounded(
            lat1 in -90.0f64..=90.0, lon1 in -180.0f64..=180.0,
            lat2 in -90.0f64..=90.0, lon2 in -180.0f64..=180.0,
        ) {
            let ab = haversine_meters(lat1, lon1, lat2, lon2);
            let ba = haversine_meters(lat2, lon2, lat1, lon1);
            prop_assert!(ab >= 0.0);
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!(ab <= std::f64::consts::PI * EARTH_RADIUS_M + 1.0);
        }
    }
}
