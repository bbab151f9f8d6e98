// src/pipeline/geo.rs
use crate::model::{Coordinates, EventCandidate};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance (haversine).
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Unknown locations always pass.
pub fn within_radius(ev: &EventCandidate, origin: Coordinates, radius_km: f64) -> bool {
    match ev.coordinates {
        None => true,
        Some(c) => haversine_km(origin, c) <= radius_km,
    }
}

/// Retain candidates inside the radius; returns how many were dropped.
pub fn filter_by_radius(
    items: Vec<EventCandidate>,
    origin: Coordinates,
    radius_km: f64,
) -> (Vec<EventCandidate>, usize) {
    let before = items.len();
    let kept: Vec<_> = items
        .into_iter()
        .filter(|ev| within_radius(ev, origin, radius_km))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}
