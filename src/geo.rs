//! Great-circle distance helpers.
//!
//! Straight-line distance is the physical lower bound every reported road
//! distance is checked against.

use crate::model::Coordinates;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points in kilometers.
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Per-segment great-circle distances across consecutive points.
pub fn segment_distances_km(points: &[Coordinates]) -> Vec<f64> {
    points
        .windows(2)
        .map(|pair| haversine_km(pair[0], pair[1]))
        .collect()
}

/// Great-circle distance summed across consecutive points.
pub fn path_distance_km(points: &[Coordinates]) -> f64 {
    segment_distances_km(points).iter().sum()
}

/// Travel time in minutes for `km` at `speed_kmh`.
pub fn km_to_minutes(km: f64, speed_kmh: f64) -> f64 {
    if speed_kmh <= 0.0 {
        return 0.0;
    }
    km / speed_kmh * 60.0
}
