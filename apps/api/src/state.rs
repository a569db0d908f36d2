use std::sync::Arc;

use crate::config::Config;
use crate::matching::service::MatchingService;
use crate::profiler::Profiler;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Session registry shared by every in-flight request.
    pub profiler: Arc<Profiler>,
    pub matcher: Arc<MatchingService>,
}
