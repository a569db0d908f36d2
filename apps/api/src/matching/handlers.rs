//! Axum route handlers for the Matching API.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::service::MatchOutcome;
use crate::profiler::{time_block, Profiler, Summary};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    #[serde(flatten)]
    pub outcome: MatchOutcome,
    /// `{}` when the session summary could not be read.
    #[serde(serialize_with = "summary_or_empty")]
    pub profiling: Option<Summary>,
}

fn summary_or_empty<S: Serializer>(summary: &Option<Summary>, s: S) -> Result<S::Ok, S::Error> {
    match summary {
        Some(summary) => summary.serialize(s),
        None => serde_json::Map::new().serialize(s),
    }
}

/// Short per-request session id: the first 8 hex digits of a v4 UUID.
fn new_session_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Ends the request's session when dropped, including when the handler
/// future is cancelled mid-analysis.
struct SessionGuard {
    profiler: Arc<Profiler>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.profiler.end_session(Some(&self.session_id));
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /match
///
/// Runs the analysis inside a fresh profiling session and returns the
/// session summary alongside the result. The session is closed whether or
/// not the analysis succeeded.
pub async fn handle_match(
    State(state): State<AppState>,
    Json(request): Json<Value>,
) -> Result<Json<MatchResponse>, AppError> {
    let session = SessionGuard {
        profiler: state.profiler.clone(),
        session_id: state.profiler.start_session(&new_session_id()),
    };
    let session_id = session.session_id.clone();
    let input_size = request.to_string().len();

    let outcome = state
        .profiler
        .scope(&session_id, async {
            let _request = time_block("Request Processing")
                .with_details(format!("Input size: {input_size} chars"));
            state.matcher.match_raw(&request).await
        })
        .await;

    drop(session);
    let outcome = outcome?;

    let profiling = state.profiler.get_session_summary(Some(&session_id));
    if let Some(summary) = &profiling {
        info!(
            "Match request {} profiled: total={:.4}s, slowest={:?}",
            session_id,
            summary.total_time,
            summary.bottlenecks.first().map(|b| b.0.as_str())
        );
        debug!("\n{}", summary.render());
    }

    Ok(Json(MatchResponse { outcome, profiling }))
}

/// POST /match/summary
///
/// Same analysis without profiling metadata.
pub async fn handle_match_summary(
    State(state): State<AppState>,
    Json(request): Json<Value>,
) -> Result<Json<MatchOutcome>, AppError> {
    let outcome = state.matcher.match_raw(&request).await?;
    Ok(Json(outcome))
}

/// GET /profiling/:session_id
///
/// Summary of a session still retained by the profiler.
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Summary>, AppError> {
    state
        .profiler
        .get_session_summary(Some(&session_id))
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Profiling session {session_id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_is_eight_hex_chars() {
        let id = new_session_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_session_id());
    }
}
