// src/diagnostics.rs
use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
    time::Instant,
};

use axum::{extract::Query, routing::get, Json, Router};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const HISTORY_CAP: usize = 500;
const LAT_CAP: usize = 200;
const DEFAULT_HISTORY_LIMIT: usize = 50;
const SLOW_REQ_MS: u128 = 5_000;

/// One `/api/events` request. The query text itself is never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestSummary {
    pub at_ms: u128,
    pub query_hash: String,
    pub mode: String,
    pub from: Option<String>,
    pub count: usize,
    pub cache: String,
    pub latency_ms: u128,
}

#[derive(Default, Clone, Serialize)]
pub struct Stats {
    pub total_requests: u64,
    pub live_requests: u64,
    pub mock_requests: u64,
    pub links_requests: u64,
    pub cache_hits: u64,
    pub empty_results: u64,
    pub last_slow_ms: Option<u128>,
    pub rolling_avg_ms: Option<f64>,
}

static HISTORY: Lazy<Mutex<VecDeque<RequestSummary>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(HISTORY_CAP)));
static STATS: Lazy<Mutex<Stats>> = Lazy::new(|| Mutex::new(Stats::default()));
static LAT_MS: Lazy<Mutex<VecDeque<u128>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(LAT_CAP)));

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/debug/history", get(history))
        .route("/debug/stats", get(stats))
}

/// Short stable hash for logs and history; empty input stays empty.
pub fn anon_hash(query: &str) -> String {
    let q = query.trim();
    if q.is_empty() {
        return String::new();
    }
    let digest = Sha256::digest(q.as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

pub fn record_request(summary: RequestSummary) {
    {
        let mut s = STATS.lock().unwrap_or_else(PoisonError::into_inner);
        s.total_requests += 1;
        match summary.mode.as_str() {
            "mock" => s.mock_requests += 1,
            "links" => s.links_requests += 1,
            _ => s.live_requests += 1,
        }
        if summary.cache == "HIT" {
            s.cache_hits += 1;
        }
        if summary.count == 0 {
            s.empty_results += 1;
        }
    }
    record_latency(summary.latency_ms);

    let mut h = HISTORY.lock().unwrap_or_else(PoisonError::into_inner);
    if h.len() >= HISTORY_CAP {
        h.pop_front();
    }
    h.push_back(summary);
}

fn record_latency(lat_ms: u128) {
    let mut q = LAT_MS.lock().unwrap_or_else(PoisonError::into_inner);
    if q.len() >= LAT_CAP {
        q.pop_front();
    }
    q.push_back(lat_ms);

    let mut s = STATS.lock().unwrap_or_else(PoisonError::into_inner);
    let sum: u128 = q.iter().copied().sum();
    s.rolling_avg_ms = Some(sum as f64 / q.len() as f64);

    if lat_ms > SLOW_REQ_MS {
        s.last_slow_ms = Some(lat_ms);
    }
}

/// Newest `limit` summaries, oldest first.
pub fn recent(limit: usize) -> Vec<RequestSummary> {
    let h = HISTORY.lock().unwrap_or_else(PoisonError::into_inner);
    let start = h.len().saturating_sub(limit);
    h.iter().skip(start).cloned().collect()
}

pub fn snapshot_stats() -> Stats {
    STATS.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

async fn history(Query(q): Query<HistoryQuery>) -> Json<Vec<RequestSummary>> {
    Json(recent(q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)))
}

async fn stats() -> Json<Stats> {
    Json(snapshot_stats())
}

/// Milliseconds since the first call in this process.
pub fn now_ms() -> u128 {
    static START: Lazy<Instant> = Lazy::new(Instant::now);
    START.elapsed().as_millis()
}
