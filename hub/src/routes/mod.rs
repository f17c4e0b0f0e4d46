pub mod inputs;
pub mod optimize;
pub mod results;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Assemble the API router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(inputs::routes())
        .merge(optimize::routes())
        .merge(results::routes())
}
