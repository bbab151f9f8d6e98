// tests/common/mod.rs
//
// Shared helpers: an in-process router over canned HTML pages.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt as _; // for `oneshot`

use event_scout::ai::{DisabledClient, DynAiClient};
use event_scout::config::EventsConfig;
use event_scout::fetch::{SourceFetcher, StaticFetcher};
use event_scout::{router, AppState};

pub const BODY_LIMIT: usize = 1024 * 1024;

pub const CITY_URL: &str = "https://www.city.sagamihara.kanagawa.jp/event_calendar.html";
pub const MUSEUM_URL: &str = "https://sagamiharacitymuseum.jp/event/";
pub const DOWN_URL: &str = "https://down.example/events";

pub fn fixture_fetcher() -> StaticFetcher {
    StaticFetcher::new()
        .with_page(CITY_URL, include_str!("../fixtures/city_calendar.html"))
        .with_page(MUSEUM_URL, include_str!("../fixtures/museum_events.html"))
}

pub fn test_config() -> EventsConfig {
    EventsConfig {
        sources: vec![CITY_URL.into(), MUSEUM_URL.into(), DOWN_URL.into()],
        ..Default::default()
    }
}

/// Counts fetches and optionally delays each one.
pub struct CountingFetcher {
    pub inner: StaticFetcher,
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl CountingFetcher {
    pub fn new(delay: Duration) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner: fixture_fetcher(),
                calls: calls.clone(),
                delay,
            },
            calls,
        )
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for CountingFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.fetch_html(url).await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

pub fn app_with(cfg: EventsConfig, fetcher: Arc<dyn SourceFetcher>, ai: DynAiClient) -> Router {
    router(AppState::new(cfg, fetcher, ai))
}

/// Fixture pages, no model.
pub fn fixture_app() -> Router {
    app_with(test_config(), Arc::new(fixture_fetcher()), Arc::new(DisabledClient))
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET request");
    send(app, req).await
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let resp = app.clone().oneshot(req).await.expect("router response");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, headers, v)
}

/// Percent-encode a query value (the router does not accept raw UTF-8).
pub fn enc(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
