// src/strategy/mod.rs
//! Ordered extraction strategies. The chain stops at the first strategy that
//! yields anything; failures are recorded and the next strategy runs.

pub mod links;
pub mod llm;

use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, histogram};

use crate::ai::DynAiClient;
use crate::config::EventsConfig;
use crate::extract::html::host_of;
use crate::model::{EventCandidate, Harvest, Link};

pub use links::{link_to_event, GenericKeywordStrategy, QueryLinkStrategy, RawListingStrategy};
pub use llm::LlmStrategy;

/// Links handed to the strategies; the pipeline narrows them later.
pub const LISTING_LIMIT: usize = 40;

/// Everything a strategy may read.
pub struct ExtractionContext<'a> {
    pub harvest: &'a Harvest,
    pub query: &'a str,
    pub region: &'a str,
    pub llm_text_cap: usize,
    pub listing_limit: usize,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(harvest: &'a Harvest, query: &'a str, cfg: &'a EventsConfig) -> Self {
        Self {
            harvest,
            query,
            region: &cfg.region,
            llm_text_cap: cfg.llm_text_cap,
            listing_limit: LISTING_LIMIT,
        }
    }

    pub fn links(&self) -> &'a [Link] {
        &self.harvest.links
    }
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Stable identifier reported as `from` in debug output.
    fn name(&self) -> &'static str;
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<EventCandidate>>;
}

/// Result of a chain run.
#[derive(Debug, Default)]
pub struct ChainOutcome {
    pub events: Vec<EventCandidate>,
    /// Strategy that produced `events`; `None` when every strategy came up empty.
    pub from: Option<&'static str>,
    pub errors: Vec<String>,
}

pub struct StrategyChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// llm → links-query → links-generic → raw-listing.
    pub fn standard(ai: DynAiClient) -> Self {
        Self::new(vec![
            Box::new(LlmStrategy::new(ai)),
            Box::new(QueryLinkStrategy),
            Box::new(GenericKeywordStrategy),
            Box::new(RawListingStrategy),
        ])
    }

    /// Chain used for the canned link list: no model, no keyword gate.
    pub fn links_only() -> Self {
        Self::new(vec![Box::new(QueryLinkStrategy), Box::new(RawListingStrategy)])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, ctx: &ExtractionContext<'_>) -> ChainOutcome {
        let mut out = ChainOutcome::default();
        for s in &self.strategies {
            let started = Instant::now();
            let result = s.extract(ctx).await;
            histogram!("events_strategy_ms", "strategy" => s.name())
                .record(started.elapsed().as_secs_f64() * 1000.0);
            match result {
                Ok(events) if !events.is_empty() => {
                    counter!("events_strategy_total", "strategy" => s.name()).increment(1);
                    tracing::debug!(target: "strategy", strategy = s.name(), count = events.len(), "strategy produced events");
                    out.events = events;
                    out.from = Some(s.name());
                    return out;
                }
                Ok(_) => {
                    tracing::debug!(target: "strategy", strategy = s.name(), "strategy empty");
                }
                Err(e) => {
                    counter!("events_strategy_errors_total", "strategy" => s.name()).increment(1);
                    tracing::warn!(target: "strategy", strategy = s.name(), error = %format!("{e:#}"), "strategy failed");
                    out.errors.push(format!("{}: {e:#}", s.name()));
                }
            }
        }
        out
    }
}

/// Fixed link list served in mock mode.
pub fn mock_links() -> Vec<Link> {
    const MOCK: &[(&str, &str)] = &[
        ("https://example.com/koke-kansatsu", "苔の観察会（相模原・緑区）"),
        ("https://example.com/kokedama-ws", "苔玉づくりワークショップ 5月10日"),
        ("https://example.com/mokko", "親子木工教室（橋本）"),
        ("https://example.com/knit", "はじめての編み物教室"),
        ("https://example.com/hoshizora", "星空観望会 5/17"),
        ("https://example.com/flower", "フラワーアレンジメント体験（相模大野）"),
    ];
    MOCK.iter()
        .map(|(url, label)| Link {
            url: (*url).to_string(),
            label: (*label).to_string(),
            host: host_of(url).unwrap_or_default(),
        })
        .collect()
}
