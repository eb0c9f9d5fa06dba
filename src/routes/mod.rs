pub mod health;
pub mod learn;
pub mod study_sets;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::middleware::request_id;
use crate::state::AppState;

/// Maximum request body size: 2 MiB.
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/study-sets", study_sets::router())
        .nest("/learn", learn::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
