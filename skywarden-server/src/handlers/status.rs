// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Liveness and process status.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use skywarden_ingest::StatsSnapshot;

use crate::error::ApiError;
use crate::state::SharedState;

/// GET /health
///
/// 200 with `{"status": "healthy"}` when the store answers, 503 otherwise.
pub async fn health(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    skywarden_store::ping(&state.pool)
        .await
        .map_err(|err| ApiError::unavailable(format!("Database connection failed: {err}")))?;
    Ok(Json(json!({ "status": "healthy" })))
}

/// Process status payload.
#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub ingest: StatsSnapshot,
    pub kit_count: usize,
}

/// GET /status
pub async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: skywarden::VERSION.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        ingest: state.stats.snapshot(),
        kit_count: state.registry.kits().len(),
    })
}
