pub mod paths;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{handlers::ingestion, infra::app_state::AppState};

/// Ingestion and reporting routes, served at the root.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route(paths::START, post(ingestion::start_ingestion))
        .route(paths::STATUS, get(ingestion::ingestion_status))
        .route(paths::TOP_SENDERS, get(ingestion::top_senders))
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config().body_limit();

    Router::new()
        .route(paths::HEALTH, get(ingestion::health))
        .merge(create_api_router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
