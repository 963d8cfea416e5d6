//! Geographic primitives: great-circle distance, travel-time estimates,
//! and radius scans over id-keyed location maps.
//!
//! All coordinates are decimal degrees. Distances use the haversine formula
//! with a spherical earth of radius 6371 km, which is accurate to well under
//! 1% at city scale.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default average rider speed used for travel-time estimates (km/h).
pub const DEFAULT_SPEED_KMH: f64 = 25.0;

/// Default traffic factor applied to travel-time estimates.
pub const DEFAULT_TRAFFIC_FACTOR: f64 = 1.2;

/// A point on the earth's surface in decimal degrees.
///
/// Valid latitudes are in [-90, 90] and longitudes in [-180, 180]; the
/// constructor does not enforce this, callers own input sanity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Haversine great-circle distance between two locations in kilometers.
///
/// Symmetric, non-negative, and exactly zero for equal endpoints.
pub fn haversine_km(a: Location, b: Location) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Estimate travel time in whole minutes at the given average speed and
/// traffic factor. Zero-distance inputs yield exactly 0 minutes.
pub fn travel_time_minutes(
    origin: Location,
    destination: Location,
    avg_speed_kmh: f64,
    traffic_factor: f64,
) -> u32 {
    let distance_km = haversine_km(origin, destination);
    if distance_km <= 0.0 {
        return 0;
    }
    let hours = distance_km / avg_speed_kmh.max(1.0);
    (hours * 60.0 * traffic_factor).round() as u32
}

/// Scan an id -> location map and return the ids whose distance to `center`
/// is at most `radius_km`.
pub fn within_radius(
    locations: &HashMap<String, Location>,
    center: Location,
    radius_km: f64,
) -> Vec<String> {
    locations
        .iter()
        .filter(|(_, loc)| haversine_km(center, **loc) <= radius_km)
        .map(|(id, _)| id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bangalore() -> Location {
        Location::new(12.9716, 77.5946)
    }

    #[test]
    fn distance_to_self_is_zero() {
        let loc = bangalore();
        assert_eq!(haversine_km(loc, loc), 0.0);
    }

    #[test]
    fn distance_is_symmetric_to_five_decimals() {
        let a = bangalore();
        let b = Location::new(12.975, 77.601);
        let ab = haversine_km(a, b);
        let ba = haversine_km(b, a);
        assert!((ab - ba).abs() < 1e-5);
        assert!(ab > 0.0);
    }

    #[test]
    fn known_distance_roughly_correct() {
        // Bangalore to Chennai is about 290 km as the crow flies.
        let blr = bangalore();
        let maa = Location::new(13.0827, 80.2707);
        let d = haversine_km(blr, maa);
        assert!(d > 270.0 && d < 300.0, "got {d}");
    }

    #[test]
    fn zero_distance_travel_time_is_zero() {
        let loc = bangalore();
        assert_eq!(
            travel_time_minutes(loc, loc, DEFAULT_SPEED_KMH, DEFAULT_TRAFFIC_FACTOR),
            0
        );
    }

    #[test]
    fn travel_time_scales_with_traffic_factor() {
        let a = bangalore();
        let b = Location::new(13.05, 77.65);
        let free = travel_time_minutes(a, b, DEFAULT_SPEED_KMH, 1.0);
        let jammed = travel_time_minutes(a, b, DEFAULT_SPEED_KMH, 2.0);
        assert!(jammed >= free * 2 - 1);
    }

    #[test]
    fn within_radius_filters_and_is_monotonic() {
        let mut map = HashMap::new();
        map.insert("near".to_string(), Location::new(12.972, 77.595));
        map.insert("mid".to_string(), Location::new(13.00, 77.62));
        map.insert("far".to_string(), Location::new(13.20, 77.80));

        let center = bangalore();
        let tight = within_radius(&map, center, 1.0);
        let medium = within_radius(&map, center, 6.0);
        let wide = within_radius(&map, center, 50.0);

        assert_eq!(tight, vec!["near".to_string()]);
        assert!(medium.len() >= tight.len());
        assert!(wide.len() >= medium.len());
        assert_eq!(wide.len(), 3);
    }
}
