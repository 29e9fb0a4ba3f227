// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Kit management: create, update, delete, probe.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use skywarden::records::{KitSource, KitUpsert};
use skywarden_ingest::registry::{generate_kit_id, normalize_api_url, probe_kit};
use skywarden_ingest::KitTestResult;

use crate::error::ApiError;
use crate::handlers::kits::derived_status;
use crate::state::SharedState;

/// Body of POST /api/admin/kits.
#[derive(Debug, Deserialize)]
pub struct KitCreate {
    pub api_url: String,
    pub name: Option<String>,
    pub location: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Body of PUT /api/admin/kits/{id}. Absent fields stay untouched.
#[derive(Debug, Deserialize)]
pub struct KitUpdate {
    pub api_url: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub enabled: Option<bool>,
}

/// POST /api/admin/kits
///
/// Probes the kit first so the stored id can come from the kit itself;
/// registration proceeds either way, with the probe outcome reported.
pub async fn create_kit(
    State(state): State<SharedState>,
    Json(body): Json<KitCreate>,
) -> Result<Json<Value>, ApiError> {
    let api_url = normalize_api_url(&body.api_url);
    let test_result = probe_kit(&state.probe_client, &api_url).await;
    let kit_id = test_result
        .kit_id
        .clone()
        .unwrap_or_else(|| generate_kit_id(&api_url));

    let upsert = KitUpsert {
        kit_id: kit_id.clone(),
        name: Some(body.name.unwrap_or_else(|| kit_id.clone())),
        location: body.location,
        api_url: Some(api_url),
        source: KitSource::Http,
        enabled: Some(body.enabled),
    };
    let status = if test_result.success { "online" } else { "offline" };
    state.writer.create_kit(&upsert, status).await?;

    if let Err(err) = state.registry.refresh().await {
        tracing::warn!(error = %err, "registry refresh after create failed");
    }
    tracing::info!(kit_id, "kit created");

    let message = if test_result.success {
        "Kit created successfully. Connection test passed."
    } else {
        "Kit created successfully. Warning: Initial connection test failed."
    };
    Ok(Json(json!({
        "success": true,
        "kit_id": kit_id,
        "message": message,
        "connection_test": test_result,
    })))
}

/// PUT /api/admin/kits/{id}
pub async fn update_kit(
    State(state): State<SharedState>,
    Path(kit_id): Path<String>,
    Json(body): Json<KitUpdate>,
) -> Result<Json<Value>, ApiError> {
    if body.api_url.is_none() && body.name.is_none() && body.location.is_none() && body.enabled.is_none()
    {
        return Ok(Json(json!({
            "success": true,
            "message": "No changes requested",
            "kit_id": kit_id,
        })));
    }

    let api_url = body.api_url.as_deref().map(normalize_api_url);
    state
        .writer
        .update_kit(
            &kit_id,
            body.name.as_deref(),
            body.location.as_deref(),
            api_url.as_deref(),
            body.enabled,
        )
        .await?;

    if let Err(err) = state.registry.refresh().await {
        tracing::warn!(error = %err, "registry refresh after update failed");
    }
    tracing::info!(kit_id, "kit updated");

    Ok(Json(json!({
        "success": true,
        "message": "Kit updated successfully",
        "kit_id": kit_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub delete_data: bool,
}

/// DELETE /api/admin/kits/{id}?delete_data=bool
pub async fn delete_kit(
    State(state): State<SharedState>,
    Path(kit_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state.writer.delete_kit(&kit_id, params.delete_data).await?;

    if let Err(err) = state.registry.refresh().await {
        tracing::warn!(error = %err, "registry refresh after delete failed");
    }
    tracing::info!(kit_id, delete_data = params.delete_data, "kit deleted");

    let mut response = json!({
        "success": true,
        "message": format!("Kit {kit_id} deleted successfully"),
        "kit_id": kit_id,
    });
    if params.delete_data {
        response["deleted_data"] = serde_json::to_value(deleted).unwrap_or(Value::Null);
    }
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct TestParams {
    pub api_url: String,
}

/// POST /api/admin/kits/test?api_url=...
pub async fn test_kit(
    State(state): State<SharedState>,
    Query(params): Query<TestParams>,
) -> Json<KitTestResult> {
    Json(probe_kit(&state.probe_client, &params.api_url).await)
}

/// POST /api/admin/kits/{id}/test
pub async fn test_existing_kit(
    State(state): State<SharedState>,
    Path(kit_id): Path<String>,
) -> Result<Json<KitTestResult>, ApiError> {
    let kit = state.repo.get_kit(&kit_id).await?;
    let api_url = kit
        .api_url
        .ok_or_else(|| ApiError::bad_request(format!("Kit {kit_id} has no API URL to test")))?;
    Ok(Json(probe_kit(&state.probe_client, &api_url).await))
}

/// GET /api/admin/kits/reload-status
pub async fn reload_status(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let kits = state.repo.list_kits().await?;

    let online = kits
        .iter()
        .filter(|kit| derived_status(kit, &state.thresholds, now) == "online")
        .count();
    let enabled = kits.iter().filter(|kit| kit.enabled).count();
    let rows = state.repo.poll_status().await?;

    Ok(Json(json!({
        "total_kits": kits.len(),
        "enabled_kits": enabled,
        "online_kits": online,
        "kits": rows,
    })))
}
