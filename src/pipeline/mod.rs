// src/pipeline/mod.rs
//! Post-extraction pipeline: dedup/cap → radius filter → rank.

pub mod dedup;
pub mod geo;
pub mod normalize;
pub mod rank;

use metrics::counter;

use crate::model::{Coordinates, EventCandidate};

pub use dedup::{dedup_and_cap, dedup_key, DedupStats};
pub use geo::{filter_by_radius, haversine_km, within_radius};
pub use normalize::{normalize_all, normalize_value};
pub use rank::rank;

/// Per-request knobs for [`run`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineParams<'a> {
    pub query: &'a str,
    pub origin: Coordinates,
    pub radius_km: f64,
    pub per_host_cap: usize,
    pub limit: usize,
}

pub fn run(items: Vec<EventCandidate>, p: PipelineParams<'_>) -> Vec<EventCandidate> {
    let input = items.len();
    let (deduped, stats) = dedup_and_cap(items, p.per_host_cap);
    let (near, out_of_radius) = filter_by_radius(deduped, p.origin, p.radius_km);
    let ranked = rank(near, p.query, p.origin, p.limit);

    counter!("events_dedup_dropped_total").increment(stats.duplicates as u64);
    counter!("events_host_capped_total").increment(stats.capped as u64);
    tracing::debug!(
        target: "pipeline",
        input,
        duplicates = stats.duplicates,
        capped = stats.capped,
        out_of_radius,
        kept = ranked.len(),
        "pipeline done"
    );
    ranked
}
