// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("events_fetch_ok_total", "Source pages fetched successfully.");
        describe_counter!("events_fetch_errors_total", "Source page fetch failures.");
        describe_histogram!("events_harvest_ms", "Time to fetch and flatten all sources.");
        describe_counter!(
            "events_strategy_total",
            "Extraction strategy that produced the result, by strategy."
        );
        describe_counter!("events_strategy_errors_total", "Extraction strategy failures.");
        describe_histogram!("events_strategy_ms", "Time spent in each extraction strategy.");
        describe_counter!("events_cache_hits_total", "Harvest cache hits.");
        describe_counter!("events_cache_misses_total", "Harvest cache refreshes.");
        describe_counter!("events_dedup_dropped_total", "Candidates dropped as duplicates.");
        describe_counter!("events_host_capped_total", "Candidates dropped by the per-host cap.");
        describe_counter!("events_requests_total", "Requests to /api/events, by mode.");
        describe_gauge!("events_cache_ttl_secs", "Configured harvest cache TTL.");
    });
}

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process. Later calls (tests
    /// building several routers) get the same handle.
    pub fn init(cache_ttl_secs: u64) -> Self {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
                Ok(h) => h,
                Err(e) => {
                    // Another recorder is already global; keep a detached one so rendering works.
                    tracing::warn!(error = ?e, "prometheus recorder not installed");
                    PrometheusBuilder::new().build_recorder().handle()
                }
            })
            .clone();

        ensure_described();
        gauge!("events_cache_ttl_secs").set(cache_ttl_secs as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
