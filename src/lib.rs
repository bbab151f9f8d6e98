// src/lib.rs
// Public library surface for integration tests and the binary.

pub mod ai;
pub mod api;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod extract;
pub mod fetch;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod strategy;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::model::{Coordinates, EventCandidate, Harvest, Link};

/// Router built from config files and environment variables.
pub fn app() -> anyhow::Result<axum::Router> {
    let state = AppState::from_env()?;
    tracing::info!(
        target: "api",
        sources = state.cfg.sources.len(),
        ai = state.ai.provider_name(),
        cache_ttl_secs = state.cfg.cache_ttl_secs,
        "event service ready"
    );
    Ok(router(state))
}
