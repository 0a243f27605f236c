//! Liveness endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::core_state::CoreState;
use crate::job::{ActiveRun, JobStages};

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: &'static str,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_run: Option<ActiveRun>,
    pub store_connected: bool,
    pub stages: JobStages,
}

/// `GET /health`
pub async fn check(State(core): State<Arc<CoreState>>) -> Json<HealthResponse> {
    let active_run = core.active_run();
    Json(HealthResponse {
        ok: true,
        version: crate::config::APP_VERSION,
        running: active_run.is_some(),
        active_run,
        store_connected: core.store_connected(),
        stages: core.stages(),
    })
}
