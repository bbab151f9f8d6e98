// src/fetch.rs
//! Source page fetching and the per-refresh harvest.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::EventsConfig;
use crate::extract::html::{extract_links, page_text};
use crate::model::{Harvest, PageText};

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Raw HTML of `url`.
    async fn fetch_html(&self, url: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Live fetcher over a shared reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
    accept_language: String,
}

impl HttpFetcher {
    pub fn from_config(cfg: &EventsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
            .build()
            .context("building page fetch client")?;
        Ok(Self {
            client,
            accept_language: cfg.accept_language.clone(),
        })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, &self.accept_language)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url}: HTTP {status}"));
        }
        resp.text().await.with_context(|| format!("reading body of {url}"))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Serves canned pages; unknown URLs fail like an unreachable host.
#[derive(Default, Clone)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("GET {url}: no such page"))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Fetch every source in order and flatten the pages. A failing source is
/// recorded in `errors` and skipped; this never fails as a whole.
pub async fn harvest(fetcher: &dyn SourceFetcher, cfg: &EventsConfig) -> Harvest {
    crate::metrics::ensure_described();
    let t0 = Instant::now();
    let mut out = Harvest::default();

    for src in &cfg.sources {
        match fetcher.fetch_html(src).await {
            Ok(html) => {
                let links = extract_links(&html, src, cfg.min_link_label_chars);
                tracing::debug!(
                    target: "fetch",
                    source = %src,
                    bytes = html.len(),
                    links = links.len(),
                    "source fetched"
                );
                out.links.extend(links);
                out.pages.push(PageText {
                    source: src.clone(),
                    text: page_text(&html, cfg.page_text_cap),
                });
                counter!("events_fetch_ok_total").increment(1);
            }
            Err(e) => {
                tracing::warn!(target: "fetch", error = ?e, source = %src, fetcher = fetcher.name(), "source fetch failed");
                counter!("events_fetch_errors_total").increment(1);
                out.errors.push(format!("{src}: {e:#}"));
            }
        }
    }

    histogram!("events_harvest_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_source_is_recorded_and_skipped() {
        let cfg = EventsConfig {
            sources: vec![
                "https://a.example/list".into(),
                "https://down.example/".into(),
                "https://b.example/list".into(),
            ],
            ..Default::default()
        };
        let fetcher = StaticFetcher::new()
            .with_page(
                "https://a.example/list",
                r#"<p>A</p><a href="/e/1">苔の観察会</a>"#,
            )
            .with_page(
                "https://b.example/list",
                r#"<p>B</p><a href="https://www.b.example/e/2">星空観望会</a>"#,
            );

        let h = harvest(&fetcher, &cfg).await;
        assert_eq!(h.pages.len(), 2);
        assert_eq!(h.errors.len(), 1);
        assert!(h.errors[0].starts_with("https://down.example/"));
        assert_eq!(h.links.len(), 2);
        assert_eq!(h.links[0].url, "https://a.example/e/1");
        assert_eq!(h.links[1].host, "b.example");
        assert_eq!(h.pages[1].text, "B 星空観望会");
    }
}
