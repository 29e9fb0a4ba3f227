// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Signal detection queries.

use axum::extract::{Query, State};
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::params::SignalParams;
use crate::state::SharedState;

/// GET /api/signals
pub async fn query_signals(
    State(state): State<SharedState>,
    Query(params): Query<SignalParams>,
) -> Result<Json<Value>, ApiError> {
    let query = params.to_query()?;
    let signals = state.repo.query_signals(&query).await?;

    Ok(Json(json!({
        "signals": signals,
        "count": signals.len(),
        "time_range": {
            "start": query.range.start,
            "end": query.range.end,
        },
    })))
}
