// src/pipeline/dedup.rs
//! Composite-key deduplication and per-host capping.
//!
//! Both passes are stable: input order decides which duplicate survives and
//! which host-capped candidates are dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::extract::html::host_of;
use crate::model::EventCandidate;

pub const DEFAULT_PER_HOST_CAP: usize = 3;

static RE_TITLE_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[【】「」『』［］\[\]（）()\s]").expect("title noise regex"));

pub fn canonical_title(title: &str) -> String {
    RE_TITLE_NOISE.replace_all(title, "").to_lowercase()
}

/// `canonicalTitle@place@when`
pub fn dedup_key(ev: &EventCandidate) -> String {
    format!(
        "{}@{}@{}",
        canonical_title(&ev.title),
        ev.place.trim().to_lowercase(),
        ev.when.trim().to_lowercase()
    )
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    pub duplicates: usize,
    pub capped: usize,
}

/// Keep the first candidate per key, then at most `cap` per host.
/// Candidates whose URL does not parse are never capped.
pub fn dedup_and_cap(items: Vec<EventCandidate>, cap: usize) -> (Vec<EventCandidate>, DedupStats) {
    let mut stats = DedupStats::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut per_host: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(items.len());

    for ev in items {
        if !seen.insert(dedup_key(&ev)) {
            stats.duplicates += 1;
            continue;
        }
        if let Some(host) = host_of(&ev.url) {
            let n = per_host.entry(host).or_default();
            if *n >= cap {
                stats.capped += 1;
                continue;
            }
            *n += 1;
        }
        out.push(ev);
    }

    (out, stats)
}
