//! # Geographic Utilities
//!
//! Spherical geometry used by the matcher.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`great_circle_distance`] | Great-circle distance between two points |
//! | [`average_distance_from_point`] | Mean distance from an anchor to a set of points |
//! | [`perpendicular_distance`] | Cross-track distance of a point from an endpoint-to-endpoint geodesic |
//! | [`slope_degrees`] | Slope angle between two altitude-bearing points |
//!
//! ## Example
//!
//! ```rust
//! use probe_matcher::{GeoPoint, geo_utils};
//!
//! let a = GeoPoint::with_altitude(41.0, -87.0, 180.0);
//! let b = GeoPoint::with_altitude(41.001, -87.0, 185.0);
//!
//! let dist = geo_utils::great_circle_distance(&a, &b);
//! assert!((dist - 111.2).abs() < 0.5);
//!
//! let slope = geo_utils::slope_degrees(&a, &b);
//! assert!(slope > 2.0 && slope < 3.0);
//! ```
//!
//! ## Algorithm Notes
//!
//! Distances use the haversine formula on a sphere of mean Earth radius
//! (geo's `Haversine`). Altitude never contributes to horizontal distance.
//!
//! The cross-track distance takes the angle subtended at endpoint A between
//! the directions to B and to the point, found from the spherical law of
//! cosines over the three side lengths (in haversine form, which stays
//! accurate for sides of a few meters), and scales its sine by the distance
//! from A to the point. The result is in meters; no further unit factor is
//! applied.

use geo::{Distance, Haversine, Point};

use crate::GeoPoint;

/// Mean Earth radius in meters, matching geo's haversine radius.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in meters between two points. Altitude is ignored.
///
/// # Example
///
/// ```rust
/// use probe_matcher::{GeoPoint, geo_utils};
///
/// let london = GeoPoint::new(51.5074, -0.1278);
/// let paris = GeoPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::great_circle_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0);
/// ```
#[inline]
pub fn great_circle_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Mean great-circle distance from `anchor` to each of `points`.
///
/// Returns `None` for an empty point set.
pub fn average_distance_from_point(anchor: &GeoPoint, points: &[GeoPoint]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    let total: f64 = points
        .iter()
        .map(|p| great_circle_distance(anchor, p))
        .sum();
    Some(total / points.len() as f64)
}

/// Cross-track distance in meters of `point` from the geodesic `endpoint_a`-`endpoint_b`.
///
/// Returns 0 when the point coincides with either endpoint or the endpoints
/// coincide.
pub fn perpendicular_distance(endpoint_a: &GeoPoint, endpoint_b: &GeoPoint, point: &GeoPoint) -> f64 {
    let dist_ap = great_circle_distance(point, endpoint_a);
    let dist_ab = great_circle_distance(endpoint_a, endpoint_b);
    if dist_ap == 0.0 || dist_ab == 0.0 {
        return 0.0;
    }
    let dist_bp = great_circle_distance(point, endpoint_b);
    if dist_bp == 0.0 {
        return 0.0;
    }

    dist_ap * subtended_angle(dist_ap, dist_ab, dist_bp).sin()
}

/// Angle at A of the spherical triangle with sides `ap`, `ab` adjacent to A
/// and `bp` opposite, all in meters.
fn subtended_angle(ap: f64, ab: f64, bp: f64) -> f64 {
    let (ap, ab, bp) = (ap / EARTH_RADIUS_M, ab / EARTH_RADIUS_M, bp / EARTH_RADIUS_M);
    let denom = ap.sin() * ab.sin();
    if denom == 0.0 {
        return 0.0;
    }
    // hav(C) = (hav(bp) - hav(ap - ab)) / (sin(ap) sin(ab))
    let hav_c = ((haversine(bp) - haversine(ap - ab)) / denom).clamp(0.0, 1.0);
    2.0 * hav_c.sqrt().asin()
}

#[inline]
fn haversine(theta: f64) -> f64 {
    let half = (theta / 2.0).sin();
    half * half
}

// =============================================================================
// Slope
// =============================================================================

/// Slope angle in degrees from `node_a` to `node_b`.
///
/// Returns 0 when either point lacks altitude or the horizontal distance
/// between them is zero. The rise/run ratio is not clamped.
pub fn slope_degrees(node_a: &GeoPoint, node_b: &GeoPoint) -> f64 {
    let (alt_a, alt_b) = match (node_a.altitude, node_b.altitude) {
        (Some(a), Some(b)) => (a, b),
        _ => return 0.0,
    };
    let horizontal = great_circle_distance(node_a, node_b);
    if horizontal == 0.0 {
        return 0.0;
    }
    ((alt_b - alt_a) / horizontal).atan().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> GeoPoint {
        GeoPoint::with_altitude(41.0, -87.0, 180.0)
    }

    fn non_reference() -> GeoPoint {
        GeoPoint::with_altitude(41.001, -87.0, 185.0)
    }

    #[test]
    fn test_coincident_distance_is_zero() {
        let p = reference();
        assert_eq!(great_circle_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_distance_ignores_altitude() {
        let low = GeoPoint::with_altitude(41.0, -87.0, 0.0);
        let high = GeoPoint::with_altitude(41.001, -87.0, 5000.0);
        let flat = GeoPoint::new(41.001, -87.0);
        assert_eq!(great_circle_distance(&low, &high), great_circle_distance(&low, &flat));
    }

    #[test]
    fn test_one_millidegree_latitude() {
        let d = great_circle_distance(&reference(), &non_reference());
        assert!((d - 111.19).abs() < 0.1, "got {}", d);
    }

    #[test]
    fn test_average_distance() {
        let anchor = reference();
        assert_eq!(average_distance_from_point(&anchor, &[]), None);

        let points = vec![anchor, non_reference()];
        let avg = average_distance_from_point(&anchor, &points).unwrap();
        let full = great_circle_distance(&anchor, &non_reference());
        assert!((avg - full / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_perpendicular_endpoint_degeneracy() {
        let r = reference();
        let n = non_reference();
        assert_eq!(perpendicular_distance(&r, &n, &r), 0.0);
        assert_eq!(perpendicular_distance(&r, &n, &n), 0.0);
        // Coincident endpoints
        let p = GeoPoint::new(41.0005, -86.999);
        assert_eq!(perpendicular_distance(&r, &r, &p), 0.0);
    }

    #[test]
    fn test_perpendicular_offset_point() {
        // Link runs due north; point sits due east of the reference node.
        let r = reference();
        let n = non_reference();
        let east = GeoPoint::new(41.0, -86.999);
        let expected = great_circle_distance(&r, &east);
        let d = perpendicular_distance(&r, &n, &east);
        assert!((d - expected).abs() < 0.5, "got {} expected {}", d, expected);
    }

    #[test]
    fn test_perpendicular_point_on_line() {
        let r = reference();
        let n = non_reference();
        let mid = GeoPoint::new(41.0005, -87.0);
        let d = perpendicular_distance(&r, &n, &mid);
        assert!(d.abs() < 0.05, "got {}", d);
    }

    #[test]
    fn test_perpendicular_midway_offset() {
        // ~84m east of the middle of a north-running link
        let r = reference();
        let n = non_reference();
        let p = GeoPoint::new(41.0005, -86.999);
        let expected = great_circle_distance(&GeoPoint::new(41.0005, -87.0), &p);
        let d = perpendicular_distance(&r, &n, &p);
        assert!((d - expected).abs() < 0.5, "got {} expected {}", d, expected);
    }

    #[test]
    fn test_slope_degenerate_cases() {
        let a = reference();
        // identical point
        assert_eq!(slope_degrees(&a, &a), 0.0);
        // same altitude
        let level = GeoPoint::with_altitude(41.001, -87.0, 180.0);
        assert_eq!(slope_degrees(&a, &level), 0.0);
        // missing altitude on either side
        let no_alt = GeoPoint::new(41.001, -87.0);
        assert_eq!(slope_degrees(&a, &no_alt), 0.0);
        assert_eq!(slope_degrees(&no_alt, &a), 0.0);
        // vertical offset only
        let above = GeoPoint::with_altitude(41.0, -87.0, 500.0);
        assert_eq!(slope_degrees(&a, &above), 0.0);
    }

    #[test]
    fn test_slope_value() {
        let a = reference();
        let b = non_reference();
        let horizontal = great_circle_distance(&a, &b);
        let expected = (5.0 / horizontal).atan().to_degrees();
        assert!((slope_degrees(&a, &b) - expected).abs() < 1e-12);
        assert!((slope_degrees(&b, &a) + expected).abs() < 1e-12);
    }
}
