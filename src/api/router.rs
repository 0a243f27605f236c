//! HTTP router.
//!
//! Routes:
//! - `GET /health`: liveness plus whether a run is in flight
//! - `POST /trigger-summary`: run the summary job now

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::core_state::CoreState;

pub fn api_router(core: Arc<CoreState>) -> Router {
    Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/trigger-summary", post(endpoints::trigger::run))
        .with_state(core)
        .layer(TraceLayer::new_for_http())
}
