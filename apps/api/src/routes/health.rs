use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /
/// Service banner with the available endpoints.
pub async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": state.config.app_name,
        "version": state.config.app_version,
        "status": "active",
        "model": state.matcher.model(),
        "endpoints": {
            "match": "/match",
            "match_summary": "/match/summary",
            "profiling": "/profiling/{session_id}",
            "health": "/health"
        }
    }))
}

/// GET /health
/// Always healthy while the process is serving.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": state.config.app_name,
        "version": state.config.app_version,
        "profiler_sessions": state.profiler.session_count()
    }))
}
