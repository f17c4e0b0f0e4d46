use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;
use sweep_bridge::{InputInfo, starter_parameters};
use sweep_core::ParameterSet;

use crate::error::HubError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct InputsResponse {
    inputs: Vec<InputInfo>,
    /// Starter ranges for the numeric inputs, ready for POST /api/optimize.
    parameters: ParameterSet,
}

/// Build inputs sub-router.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/inputs", get(list_inputs))
}

/// GET /api/inputs: controls of the open strategy settings dialog.
async fn list_inputs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InputsResponse>, HubError> {
    let inputs = state.driver.list_inputs().await?;
    let parameters = starter_parameters(&inputs);
    tracing::debug!(inputs = inputs.len(), sweepable = parameters.len(), "inputs listed");
    Ok(Json(InputsResponse { inputs, parameters }))
}
