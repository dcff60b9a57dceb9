//! Geographic locations and the distance measures used for source culling.

use serde::{Deserialize, Serialize};

/// Mean earth radius in km.
pub const EARTH_RADIUS_KM: f64 = 6371.0072;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    /// Depth below the surface in km (positive down).
    #[serde(default)]
    pub depth_km: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            depth_km: 0.0,
        }
    }

    pub fn with_depth(lat: f64, lon: f64, depth_km: f64) -> Self {
        Self { lat, lon, depth_km }
    }

    /// Great-circle surface distance in km (haversine).
    pub fn horizontal_distance(&self, other: &Location) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }

    /// Straight-line distance in km including the depth difference.
    pub fn distance_3d(&self, other: &Location) -> f64 {
        let h = self.horizontal_distance(other);
        let v = self.depth_km - other.depth_km;
        (h * h + v * v).sqrt()
    }
}

/// Minimum horizontal distance from `site` to any point of `points`.
/// Infinite for an empty slice.
pub fn min_horizontal_distance(site: &Location, points: &[Location]) -> f64 {
    points
        .iter()
        .map(|p| site.horizontal_distance(p))
        .fold(f64::INFINITY, f64::min)
}

/// Minimum 3-D distance from `site` to any point of `points`.
pub fn min_distance_3d(site: &Location, points: &[Location]) -> f64 {
    points
        .iter()
        .map(|p| site.distance_3d(p))
        .fold(f64::INFINITY, f64::min)
}
