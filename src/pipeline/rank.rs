// src/pipeline/rank.rs
//! Distance-bucket + query-match scoring.

use crate::model::{Coordinates, EventCandidate};
use crate::pipeline::geo::haversine_km;

pub const DEFAULT_RESULT_LIMIT: usize = 20;
pub const QUERY_BONUS: i32 = 12;
/// Distance assumed for candidates without coordinates.
pub const UNKNOWN_DISTANCE_KM: f64 = 99.0;

pub fn distance_bucket(km: f64) -> i32 {
    if km <= 3.0 {
        15
    } else if km <= 5.0 {
        10
    } else if km <= 10.0 {
        6
    } else {
        2
    }
}

/// Literal substring match over `title tags description`.
pub fn matches_query(ev: &EventCandidate, query: &str) -> bool {
    if query.is_empty() {
        return false;
    }
    let hay = format!("{} {} {}", ev.title, ev.tags.join(" "), ev.description);
    hay.contains(query)
}

/// Set `score` and `distance_km` on one candidate.
pub fn score_candidate(ev: &mut EventCandidate, query: &str, origin: Coordinates) {
    let km = ev.coordinates.map(|c| haversine_km(origin, c));
    ev.distance_km = km;
    let mut score = distance_bucket(km.unwrap_or(UNKNOWN_DISTANCE_KM));
    if matches_query(ev, query) {
        score += QUERY_BONUS;
    }
    ev.score = score;
}

/// Score, sort by descending score (ties keep input order) and truncate.
pub fn rank(
    mut items: Vec<EventCandidate>,
    query: &str,
    origin: Coordinates,
    limit: usize,
) -> Vec<EventCandidate> {
    for ev in items.iter_mut() {
        score_candidate(ev, query, origin);
    }
    // sort_by is stable
    items.sort_by(|a, b| b.score.cmp(&a.score));
    items.truncate(limit);
    items
}
