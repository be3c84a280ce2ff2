//! Great-circle distance on a spherical Earth
//!
//! Haversine is accurate to roughly 0.5% for terrestrial distances, which is
//! well inside the tolerance of any zone radius we classify against.

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two points given in degrees.
///
/// NaN inputs propagate to a NaN result; callers validate coordinates.
#[inline]
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Format a coordinate pair the way alert messages fall back to when no
/// place name is available
pub fn format_coords(lat: f64, lon: f64) -> String {
    format!("{:.4}, {:.4}", lat, lon)
}

/// Google Maps link for a coordinate
pub fn maps_link(lat: f64, lon: f64) -> String {
    format!("https://www.google.com/maps?q={},{}", lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coincident_points_are_zero() {
        for (lat, lon) in [(0.0, 0.0), (28.6139, 77.2090), (-33.8688, 151.2093), (89.9, -179.9)] {
            assert_eq!(distance_m(lat, lon, lat, lon), 0.0);
        }
    }

    #[test]
    fn test_symmetry() {
        let pairs = [
            ((28.6139, 77.2090), (19.0760, 72.8777)),
            ((51.5074, -0.1278), (40.7128, -74.0060)),
            ((-1.0, 179.5), (1.0, -179.5)),
        ];
        for ((a_lat, a_lon), (b_lat, b_lon)) in pairs {
            let ab = distance_m(a_lat, a_lon, b_lat, b_lon);
            let ba = distance_m(b_lat, b_lon, a_lat, a_lon);
            assert!((ab - ba).abs() < 1e-6, "ab={} ba={}", ab, ba);
        }
    }

    #[test]
    fn test_tenth_degree_longitude_at_equator() {
        let d = distance_m(0.0, 0.0, 0.0, 0.1);
        assert!((d - 11_119.5).abs() < 20.0, "d={}", d);
    }

    #[test]
    fn test_known_city_distance() {
        // London to Paris is about 344 km
        let d = distance_m(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d - 343_500.0).abs() < 3_500.0, "d={}", d);
    }

    #[test]
    fn test_antimeridian_is_short() {
        let d = distance_m(0.0, 179.95, 0.0, -179.95);
        assert!(d < 12_000.0, "d={}", d);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(distance_m(f64::NAN, 0.0, 0.0, 0.0).is_nan());
    }

    #[test]
    fn test_format_coords() {
        assert_eq!(format_coords(28.613912, 77.209), "28.6139, 77.2090");
        assert_eq!(maps_link(1.5, -2.25), "https://www.google.com/maps?q=1.5,-2.25");
    }
}
