mod config;
mod errors;
mod llm_client;
mod matching;
mod profiler;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::matching::service::{MatchingService, RetryPolicy};
use crate::profiler::Profiler;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_PKG_NAME"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting {} v{}{}",
        config.app_name,
        config.app_version,
        if config.debug { " (debug)" } else { "" }
    );

    // Initialize LLM client
    let llm = LlmClient::new(&config)?;
    info!(
        "LLM client initialized (model: {}, base URL: {})",
        config.openai_model, config.openai_base_url
    );

    let retry = RetryPolicy::from_config(&config);
    info!(
        "Completion retries: {} attempts, {}ms apart, {}s timeout each",
        retry.max_attempts,
        retry.delay.as_millis(),
        config.timeout_seconds
    );
    let matcher = Arc::new(MatchingService::new(Arc::new(llm), retry));

    // Profiling sessions are retained for /profiling lookups until evicted
    let profiler = Arc::new(Profiler::new(config.profiler_max_sessions));
    info!(
        "Profiler ready (retaining up to {} sessions)",
        config.profiler_max_sessions
    );

    let state = AppState {
        config: config.clone(),
        profiler,
        matcher,
    };

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
