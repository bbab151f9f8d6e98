// src/api.rs
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::ai::{build_ai_client, DynAiClient};
use crate::cache::{CacheStatus, SnapshotCache};
use crate::config::EventsConfig;
use crate::diagnostics::{self, anon_hash, RequestSummary};
use crate::extract::heuristics::{rank_links, score_links};
use crate::fetch::{self, HttpFetcher, SourceFetcher};
use crate::metrics::Metrics;
use crate::model::{Coordinates, EventCandidate, Harvest};
use crate::pipeline::{self, PipelineParams};
use crate::profile::{method_not_allowed, profile_extract};
use crate::strategy::{links::LINK_HOST_CAP, mock_links, ExtractionContext, StrategyChain};

/// Reported as `build` in diagnostic bodies.
pub const BUILD: &str = concat!(env!("CARGO_PKG_NAME"), "@", env!("CARGO_PKG_VERSION"));
pub const CACHE_HEADER: &str = "x-events-cache";

const DEBUG_SAMPLE: usize = 8;
const LINKS_SAMPLE: usize = 12;
const LINKS_KEPT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<EventsConfig>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub ai: DynAiClient,
    pub harvest_cache: Arc<SnapshotCache<Harvest>>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(cfg: EventsConfig, fetcher: Arc<dyn SourceFetcher>, ai: DynAiClient) -> Self {
        let ttl = Duration::from_secs(cfg.cache_ttl_secs);
        let metrics = Metrics::init(cfg.cache_ttl_secs);
        Self {
            cfg: Arc::new(cfg),
            fetcher,
            ai,
            harvest_cache: Arc::new(SnapshotCache::new(ttl)),
            metrics,
        }
    }

    /// Config files + environment, real HTTP fetcher.
    pub fn from_env() -> Result<Self> {
        let cfg = EventsConfig::load_default().context("loading events config")?;
        let fetcher = HttpFetcher::from_config(&cfg).context("building http fetcher")?;
        Ok(Self::new(cfg, Arc::new(fetcher), build_ai_client()))
    }
}

pub fn router(state: AppState) -> Router {
    let metrics = state.metrics.router::<AppState>();
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/api/events", get(events))
        .route(
            "/api/profile-extract",
            post(profile_extract).fallback(method_not_allowed),
        )
        .merge(diagnostics::router::<AppState>())
        .merge(metrics)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "ok": true, "hasKey": state.ai.is_available() }))
}

/// Raw query string values; numbers are parsed leniently.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub q: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub radius: Option<String>,
    pub debug: Option<String>,
    pub mode: Option<String>,
    pub fresh: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Mock,
    Links,
}

impl Mode {
    fn parse(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            Some("mock") => Mode::Mock,
            Some("links") => Mode::Links,
            _ => Mode::Live,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Mock => "mock",
            Mode::Links => "links",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventsRequest {
    pub query: String,
    pub origin: Coordinates,
    pub radius_km: f64,
    pub debug: bool,
    pub mode: Mode,
    pub fresh: bool,
}

fn parse_num(s: &Option<String>) -> Option<f64> {
    s.as_deref()?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn flag(s: &Option<String>) -> bool {
    s.as_deref().map(str::trim) == Some("1")
}

impl EventsRequest {
    /// Unparsable or out-of-range numbers fall back to configured defaults.
    pub fn from_query(q: &EventsQuery, cfg: &EventsConfig) -> Result<Self> {
        let fallback = Coordinates::new(cfg.origin.lat, cfg.origin.lon)
            .ok_or_else(|| anyhow!("configured origin is out of range"))?;
        let lat = parse_num(&q.lat).unwrap_or(fallback.lat);
        let lon = parse_num(&q.lon).unwrap_or(fallback.lon);
        Ok(Self {
            query: q.q.as_deref().unwrap_or_default().trim().to_string(),
            origin: Coordinates::new(lat, lon).unwrap_or(fallback),
            radius_km: cfg.clamp_radius(parse_num(&q.radius)),
            debug: flag(&q.debug),
            mode: Mode::parse(q.mode.as_deref()),
            fresh: flag(&q.fresh),
        })
    }
}

/// What one request produced, before it is shaped into a body.
struct Served {
    body: Value,
    from: Option<&'static str>,
    count: usize,
    cache: Option<CacheStatus>,
}

async fn cached_harvest(state: &AppState, force: bool) -> (Arc<Harvest>, CacheStatus) {
    let (harvest, status) = state
        .harvest_cache
        .get_or_refresh(force, || fetch::harvest(state.fetcher.as_ref(), &state.cfg))
        .await;
    match status {
        CacheStatus::Hit => counter!("events_cache_hits_total").increment(1),
        CacheStatus::Miss => counter!("events_cache_misses_total").increment(1),
    }
    (harvest, status)
}

fn event_body(req: &EventsRequest, events: &[EventCandidate], from: Option<&str>, errors: &[String]) -> Result<Value> {
    if !req.debug {
        return serde_json::to_value(events).context("serializing events");
    }
    let sample = &events[..events.len().min(DEBUG_SAMPLE)];
    Ok(json!({
        "ok": true,
        "build": BUILD,
        "mode": req.mode.as_str(),
        "from": from.unwrap_or("none"),
        "q": req.query,
        "count": events.len(),
        "errors": errors,
        "sample": sample,
    }))
}

async fn serve_events(state: &AppState, req: &EventsRequest) -> Result<Served> {
    let (harvest, chain, cache) = match req.mode {
        Mode::Mock => {
            let h = Harvest {
                links: mock_links(),
                ..Default::default()
            };
            (Arc::new(h), StrategyChain::links_only(), None)
        }
        _ => {
            let (h, status) = cached_harvest(state, req.fresh).await;
            (h, StrategyChain::standard(state.ai.clone()), Some(status))
        }
    };

    let ctx = ExtractionContext::new(&harvest, &req.query, &state.cfg);
    let outcome = chain.run(&ctx).await;

    let events = pipeline::run(
        outcome.events,
        PipelineParams {
            query: &req.query,
            origin: req.origin,
            radius_km: req.radius_km,
            per_host_cap: state.cfg.per_host_cap,
            limit: state.cfg.result_limit,
        },
    );

    let mut errors = harvest.errors.clone();
    errors.extend(outcome.errors);
    let body = event_body(req, &events, outcome.from, &errors)?;
    Ok(Served {
        body,
        from: outcome.from,
        count: events.len(),
        cache,
    })
}

async fn serve_links(state: &AppState, req: &EventsRequest) -> Result<Served> {
    let (harvest, status) = cached_harvest(state, req.fresh).await;
    let ranked = rank_links(score_links(&harvest.links, &req.query), LINK_HOST_CAP, LINKS_KEPT);
    let sample: Vec<Value> = ranked
        .iter()
        .take(LINKS_SAMPLE)
        .map(|s| json!({ "url": s.link.url, "label": s.link.label, "score": s.score }))
        .collect();
    Ok(Served {
        body: json!({
            "ok": true,
            "build": BUILD,
            "mode": "links",
            "q": req.query,
            "total_links": harvest.links.len(),
            "kept": ranked.len(),
            "sample": sample,
        }),
        from: None,
        count: ranked.len(),
        cache: Some(status),
    })
}

async fn serve(state: AppState, req: EventsRequest) -> Result<Served> {
    match req.mode {
        Mode::Links => serve_links(&state, &req).await,
        Mode::Live | Mode::Mock => serve_events(&state, &req).await,
    }
}

fn catastrophic(debug: bool, message: String) -> Value {
    if debug {
        json!({ "ok": false, "build": BUILD, "errors": [message] })
    } else {
        json!([])
    }
}

/// Always answers 200; failures become an empty list (or a debug body).
async fn events(
    State(state): State<AppState>,
    params: Result<Query<EventsQuery>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let params = match params {
        Ok(Query(p)) => p,
        Err(e) => {
            tracing::warn!(target: "api", error = %e, "malformed query string, using defaults");
            EventsQuery::default()
        }
    };
    let debug = flag(&params.debug);

    let req = match EventsRequest::from_query(&params, &state.cfg) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(target: "api", error = %format!("{e:#}"), "bad events request setup");
            return Json(catastrophic(debug, format!("{e:#}"))).into_response();
        }
    };
    let mode = req.mode;
    let query_hash = anon_hash(&req.query);
    counter!("events_requests_total", "mode" => mode.as_str()).increment(1);
    tracing::info!(target: "api", q = %query_hash, mode = mode.as_str(), radius_km = req.radius_km, "events request");

    // Run in its own task so a panic below still yields a response.
    let served = match tokio::spawn(serve(state, req)).await {
        Ok(Ok(s)) => Ok(s),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(join) => Err(format!("events handler aborted: {join}")),
    };

    let latency_ms = started.elapsed().as_millis();
    let (body, summary) = match served {
        Ok(s) => {
            let summary = RequestSummary {
                at_ms: diagnostics::now_ms(),
                query_hash,
                mode: mode.as_str().to_string(),
                from: s.from.map(str::to_string),
                count: s.count,
                cache: s.cache.map(|c| c.as_header()).unwrap_or("-").to_string(),
                latency_ms,
            };
            let mut resp = Json(s.body).into_response();
            if let Some(c) = s.cache {
                resp.headers_mut().insert(
                    HeaderName::from_static(CACHE_HEADER),
                    HeaderValue::from_static(c.as_header()),
                );
            }
            (resp, summary)
        }
        Err(msg) => {
            tracing::error!(target: "api", error = %msg, "events request failed");
            let summary = RequestSummary {
                at_ms: diagnostics::now_ms(),
                query_hash,
                mode: mode.as_str().to_string(),
                from: None,
                count: 0,
                cache: "-".to_string(),
                latency_ms,
            };
            (Json(catastrophic(debug, msg)).into_response(), summary)
        }
    };
    tracing::debug!(target: "api", count = summary.count, latency_ms = summary.latency_ms as u64, "events response");
    diagnostics::record_request(summary);
    body
}
