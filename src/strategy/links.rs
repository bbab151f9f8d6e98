// src/strategy/links.rs
//! Link-label strategies: query match → generic keywords → raw listing.

use anyhow::Result;
use async_trait::async_trait;

use super::{ExtractionContext, ExtractionStrategy};
use crate::extract::heuristics::{
    clean_title, expand_terms, extract_when, fold, has_any, rank_links, score_links,
    LOCATION_WORDS, TITLE_BLACKLIST,
};
use crate::model::{EventCandidate, Link};

/// Per-host cap applied while picking links (the event pipeline caps again).
pub const LINK_HOST_CAP: usize = 6;
/// Fewer survivors than this after a threshold means "too strict".
pub const MIN_GENERIC_HITS: usize = 6;

/// Pseudo-event built from an anchor label.
pub fn link_to_event(link: &Link, query: &str, region: &str) -> EventCandidate {
    let mut ev = EventCandidate {
        title: clean_title(&link.label),
        place: if has_any(&link.label, LOCATION_WORDS) {
            region.to_string()
        } else {
            String::new()
        },
        when: extract_when(&link.label),
        url: link.url.clone(),
        ..Default::default()
    };
    let q = query.trim();
    if !q.is_empty() {
        ev.set_tags([q]);
    }
    ev
}

fn to_events(links: impl IntoIterator<Item = Link>, ctx: &ExtractionContext<'_>) -> Vec<EventCandidate> {
    links
        .into_iter()
        .map(|l| link_to_event(&l, ctx.query, ctx.region))
        .collect()
}

/// Links whose label contains the query or one of its synonyms. Needs a query.
pub struct QueryLinkStrategy;

#[async_trait]
impl ExtractionStrategy for QueryLinkStrategy {
    fn name(&self) -> &'static str {
        "links-query"
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<EventCandidate>> {
        let terms = expand_terms(ctx.query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let hits: Vec<Link> = ctx
            .links()
            .iter()
            .filter(|l| !has_any(&l.label, TITLE_BLACKLIST))
            .filter(|l| {
                let label = fold(&l.label);
                terms.iter().any(|t| label.contains(t.as_str()))
            })
            .cloned()
            .collect();
        let ranked = rank_links(score_links(&hits, ctx.query), LINK_HOST_CAP, ctx.listing_limit);
        Ok(to_events(ranked.into_iter().map(|s| s.link), ctx))
    }
}

/// Links that look like events by keyword heuristics, with one relaxation step.
pub struct GenericKeywordStrategy;

impl GenericKeywordStrategy {
    fn thresholds(query: &str) -> (i32, i32) {
        if query.trim().is_empty() {
            (8, 6)
        } else {
            (6, 4)
        }
    }
}

#[async_trait]
impl ExtractionStrategy for GenericKeywordStrategy {
    fn name(&self) -> &'static str {
        "links-generic"
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<EventCandidate>> {
        let scored = score_links(ctx.links(), ctx.query);
        let (strict, relaxed) = Self::thresholds(ctx.query);

        let mut picked: Vec<_> = scored.iter().filter(|s| s.score >= strict).cloned().collect();
        if picked.len() < MIN_GENERIC_HITS {
            picked = scored.iter().filter(|s| s.score >= relaxed).cloned().collect();
        }
        if picked.len() < MIN_GENERIC_HITS {
            return Ok(Vec::new());
        }
        let ranked = rank_links(picked, LINK_HOST_CAP, ctx.listing_limit);
        Ok(to_events(ranked.into_iter().map(|s| s.link), ctx))
    }
}

/// Last resort: the best-scored links, whatever they are.
pub struct RawListingStrategy;

#[async_trait]
impl ExtractionStrategy for RawListingStrategy {
    fn name(&self) -> &'static str {
        "raw-listing"
    }

    async fn extract(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<EventCandidate>> {
        let ranked = rank_links(score_links(ctx.links(), ctx.query), LINK_HOST_CAP, ctx.listing_limit);
        Ok(to_events(ranked.into_iter().map(|s| s.link), ctx))
    }
}
