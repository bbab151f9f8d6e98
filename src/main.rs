//! Event service binary entrypoint.
//! Boots the Axum HTTP server with the router from the library crate.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact request/fetch/strategy logs for local runs. Set EVENTS_DEV_LOG=1 on a
/// debug build, or under a local Shuttle env; `RUST_LOG` overrides the targets.
fn enable_dev_tracing() {
    let dev_flag = std::env::var("EVENTS_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("api=info,fetch=info,strategy=info,pipeline=debug,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    // This enables EVENTS_CONFIG_PATH / AI_CONFIG_PATH / GEMINI_API_KEY from .env.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let router = event_scout::app().map_err(shuttle_runtime::Error::Custom)?;
    Ok(router.into())
}
