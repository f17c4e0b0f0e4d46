use axum::{Json, Router, extract::State, routing::get, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use sweep_bridge::CurrentResults;
use sweep_core::BestInputs;

use crate::error::HubError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ApplyBestRequest {
    pub values: BestInputs,
}

/// Build results sub-router.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/apply-best", post(apply_best))
        .route("/api/results/current", get(current_results))
}

/// POST /api/apply-best: replay a set of inputs onto the page.
async fn apply_best(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ApplyBestRequest>,
) -> Result<Json<Value>, HubError> {
    let optimizer = state.optimizer(state.config.sweep);
    optimizer.apply_best(&body.values).await?;
    tracing::info!(count = body.values.len(), "best inputs applied");
    Ok(Json(json!({ "ok": true, "applied": body.values.len() })))
}

/// GET /api/results/current: whatever the results panel shows right now.
async fn current_results(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CurrentResults>, HubError> {
    Ok(Json(state.reader.read_current().await?))
}
