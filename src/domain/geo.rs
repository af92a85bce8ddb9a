//! Great-circle geometry on a spherical Earth model.
//!
//! All distance math in the pipeline goes through [`haversine_km`]: segment
//! distances for the GPS odometer, trip accumulation, the odometer tamper
//! comparison, and circle-geofence containment. The simulator uses
//! [`destination_point`], the forward problem, to move vehicles along a
//! heading.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS-84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in decimal degrees, `[-90, 90]`.
    pub lat: f64,
    /// Longitude in decimal degrees, `[-180, 180]`.
    pub lng: f64,
}

impl LatLng {
    /// Creates a position from latitude/longitude degrees.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns `true` when both coordinates are inside their valid ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Great-circle distance between two positions in kilometers.
///
/// Haversine formula on a 6371 km mean Earth radius. Always `>= 0` and
/// symmetric under point swap.
#[must_use]
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Great-circle distance between two positions in meters.
#[must_use]
pub fn haversine_m(a: LatLng, b: LatLng) -> f64 {
    haversine_km(a, b) * 1000.0
}

/// Destination point after traveling `distance_km` from `origin` along the
/// initial bearing `heading_deg` (0° = north, clockwise).
///
/// Forward geodesic on the same spherical model as [`haversine_km`]; the
/// simulator uses it to advance vehicles between ticks.
#[must_use]
pub fn destination_point(origin: LatLng, heading_deg: f64, distance_km: f64) -> LatLng {
    let heading = heading_deg.to_radians();
    let lat1 = origin.lat.to_radians();
    let angular = distance_km / EARTH_RADIUS_KM;

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * heading.cos()).asin();
    let lng2 = origin.lng.to_radians()
        + (heading.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    LatLng::new(lat2.to_degrees(), lng2.to_degrees())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const DELHI: LatLng = LatLng::new(28.6139, 77.2090);
    const GURGAON: LatLng = LatLng::new(28.4595, 77.0266);
    const MUMBAI: LatLng = LatLng::new(19.0760, 72.8777);

    #[test]
    fn zero_for_coincident_points() {
        assert_eq!(haversine_km(DELHI, DELHI), 0.0);
    }

    #[test]
    fn symmetric_under_swap() {
        let ab = haversine_km(DELHI, MUMBAI);
        let ba = haversine_km(MUMBAI, DELHI);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn triangle_inequality() {
        let ab = haversine_km(DELHI, GURGAON);
        let bc = haversine_km(GURGAON, MUMBAI);
        let ac = haversine_km(DELHI, MUMBAI);
        assert!(ac <= ab + bc + 1e-9);
    }

    #[test]
    fn known_distance_delhi_mumbai() {
        // Great-circle Delhi–Mumbai is roughly 1150 km.
        let d = haversine_km(DELHI, MUMBAI);
        assert!((1100.0..1200.0).contains(&d), "got {d}");
    }

    #[test]
    fn destination_round_trips_through_haversine() {
        let dest = destination_point(DELHI, 90.0, 25.0);
        let d = haversine_km(DELHI, dest);
        assert!((d - 25.0).abs() < 0.01, "got {d}");
    }

    #[test]
    fn destination_north_increases_latitude() {
        let dest = destination_point(DELHI, 0.0, 10.0);
        assert!(dest.lat > DELHI.lat);
        assert!((dest.lng - DELHI.lng).abs() < 1e-6);
    }

    #[test]
    fn latlng_validity_ranges() {
        assert!(LatLng::new(90.0, 180.0).is_valid());
        assert!(LatLng::new(-90.0, -180.0).is_valid());
        assert!(!LatLng::new(90.1, 0.0).is_valid());
        assert!(!LatLng::new(0.0, -180.5).is_valid());
    }
}
