// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Kit listing with derived status.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use skywarden::kit_health::{KitStatus, StatusThresholds};
use skywarden_store::Kit;

use crate::error::ApiError;
use crate::state::SharedState;

/// A kit as the API presents it: status re-derived from `last_seen` at
/// read time, so a kit can never look online from a stale stored status.
#[derive(Debug, Serialize)]
pub struct KitView {
    pub kit_id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub api_url: Option<String>,
    pub source: String,
    pub status: String,
    pub enabled: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Derive the presented status from `last_seen`.
pub fn derived_status(kit: &Kit, thresholds: &StatusThresholds, now: DateTime<Utc>) -> String {
    let since_seen = kit
        .last_seen
        .map(|seen| (now - seen).num_milliseconds().max(0) as f64 / 1000.0);
    KitStatus::classify_secs(since_seen, thresholds)
        .as_str()
        .to_string()
}

pub fn to_view(kit: &Kit, thresholds: &StatusThresholds, now: DateTime<Utc>) -> KitView {
    KitView {
        kit_id: kit.kit_id.clone(),
        name: kit.name.clone(),
        location: kit.location.clone(),
        api_url: kit.api_url.clone(),
        source: kit.source.clone(),
        status: derived_status(kit, thresholds, now),
        enabled: kit.enabled,
        last_seen: kit.last_seen,
        created_at: kit.created_at,
    }
}

#[derive(Debug, Deserialize)]
pub struct KitListParams {
    pub kit_id: Option<String>,
}

/// GET /api/kits
pub async fn list_kits(
    State(state): State<SharedState>,
    Query(params): Query<KitListParams>,
) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let kits = state.repo.list_kits().await?;

    let views: Vec<KitView> = kits
        .iter()
        .filter(|kit| {
            params
                .kit_id
                .as_deref()
                .map(|wanted| kit.kit_id == wanted)
                .unwrap_or(true)
        })
        .map(|kit| to_view(kit, &state.thresholds, now))
        .collect();

    Ok(Json(json!({ "kits": views, "count": views.len() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn kit(last_seen: Option<DateTime<Utc>>) -> Kit {
        Kit {
            kit_id: "kit-a".to_string(),
            name: Some("Kit A".to_string()),
            location: None,
            api_url: None,
            source: "mqtt".to_string(),
            status: "online".to_string(),
            enabled: true,
            last_seen,
            created_at: None,
        }
    }

    #[test]
    fn test_derived_status_overrides_stored() {
        let thresholds = StatusThresholds::default();
        let now = Utc::now();

        // Stored status says online, but the kit has been silent for ten
        // minutes: the view says offline.
        let stale_kit = kit(Some(now - Duration::minutes(10)));
        assert_eq!(derived_status(&stale_kit, &thresholds, now), "offline");

        let fresh_kit = kit(Some(now - Duration::seconds(5)));
        assert_eq!(derived_status(&fresh_kit, &thresholds, now), "online");

        let aging_kit = kit(Some(now - Duration::seconds(60)));
        assert_eq!(derived_status(&aging_kit, &thresholds, now), "stale");

        let never_seen = kit(None);
        assert_eq!(derived_status(&never_seen, &thresholds, now), "unknown");
    }
}
