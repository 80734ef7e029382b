//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use crate::ui::state::AppState;

/// Health check endpoint: store counters, or 500 when the store is
/// unreachable.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.get_stats_usecase.execute().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "OK",
                "activeGroups": stats.groups,
                "totalUsers": stats.users,
                "totalMessages": stats.messages,
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "ERROR",
                    "message": "Database connection failed",
                })),
            )
        }
    }
}
