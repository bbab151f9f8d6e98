// src/strategy/llm.rs
//! Model-backed extraction over the harvested page text.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{ExtractionContext, ExtractionStrategy};
use crate::ai::prompt::{event_prompt, parse_json_array};
use crate::ai::DynAiClient;
use crate::model::EventCandidate;
use crate::pipeline::normalize_all;

pub struct LlmStrategy {
    ai: DynAiClient,
}

impl LlmStrategy {
    pub fn new(ai: DynAiClient) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl ExtractionStrategy for LlmStrategy {
    fn name(&self) -> &'static str {
        "llm"
    }

    /// Skipped (empty) when no model is configured or nothing was harvested.
    /// A reply that is not a JSON array is an error, not an empty result.
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<EventCandidate>> {
        if !self.ai.is_available() {
            return Ok(Vec::new());
        }
        let text = ctx.harvest.combined_text(ctx.llm_text_cap);
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let prompt = event_prompt(ctx.region, &text);
        let reply = self.ai.generate(&prompt).await?;
        let arr = parse_json_array(&reply.text)
            .ok_or_else(|| anyhow!("model reply is not a JSON array"))?;
        Ok(normalize_all(&arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiReply, DisabledClient, MockClient, MockProvider};
    use crate::model::{Harvest, PageText};
    use std::sync::Arc;

    fn harvest() -> Harvest {
        Harvest {
            pages: vec![PageText {
                source: "https://a.jp".into(),
                text: "苔玉づくり 5月10日".into(),
            }],
            ..Default::default()
        }
    }

    fn ctx(h: &Harvest) -> ExtractionContext<'_> {
        ExtractionContext {
            harvest: h,
            query: "",
            region: "相模原",
            llm_text_cap: 1_000,
            listing_limit: 40,
        }
    }

    #[tokio::test]
    async fn mock_reply_is_normalized() {
        let s = LlmStrategy::new(Arc::new(MockClient::new(MockProvider::sample_events())));
        let h = harvest();
        let out = s.extract(&ctx(&h)).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "苔玉づくりワークショップ");
        assert!(out[0].coordinates.is_some());
    }

    #[tokio::test]
    async fn disabled_or_empty_text_is_skipped() {
        let s = LlmStrategy::new(Arc::new(DisabledClient));
        let h = harvest();
        assert!(s.extract(&ctx(&h)).await.unwrap().is_empty());

        let s = LlmStrategy::new(Arc::new(MockClient::new(MockProvider::sample_events())));
        let empty = Harvest::default();
        assert!(s.extract(&ctx(&empty)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparsable_reply_is_an_error() {
        let s = LlmStrategy::new(Arc::new(MockClient::new(MockProvider {
            fixed: Ok(AiReply {
                text: "sorry, no events".into(),
            }),
        })));
        let h = harvest();
        assert!(s.extract(&ctx(&h)).await.is_err());
    }
}
