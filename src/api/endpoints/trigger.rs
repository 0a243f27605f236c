//! On-demand summary run.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::job::{RunReport, TriggerSource};

#[derive(Serialize)]
pub struct TriggerResponse {
    pub ok: bool,
    pub run: RunReport,
}

/// `POST /trigger-summary`. Runs the job and answers when it finishes.
/// A run already in flight yields 409.
///
/// The run lives in its own task, so a client that hangs up early does not
/// cancel it halfway through.
pub async fn run(State(core): State<Arc<CoreState>>) -> Result<Json<TriggerResponse>, ApiError> {
    let job = core.job();
    let run = tokio::spawn(async move { job.run(TriggerSource::OnDemand).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Summary task failed: {e}")))??;
    Ok(Json(TriggerResponse { ok: true, run }))
}
