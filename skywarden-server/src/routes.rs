// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Route table, constructed once at startup.

use axum::routing::{get, post, put};
use axum::Router;

use crate::csv_export;
use crate::handlers::{admin, analysis, kits, patterns, signals, status, tracks};
use crate::state::SharedState;

/// Build the full router over the shared state.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/api/kits", get(kits::list_kits))
        .route("/api/drones", get(tracks::query_drones))
        .route("/api/drones/{drone_id}/track", get(tracks::drone_track))
        .route("/api/signals", get(signals::query_signals))
        .route("/api/export/csv", get(csv_export::export_csv))
        .route("/api/admin/kits", post(admin::create_kit))
        .route("/api/admin/kits/test", post(admin::test_kit))
        .route("/api/admin/kits/reload-status", get(admin::reload_status))
        .route(
            "/api/admin/kits/{kit_id}",
            put(admin::update_kit).delete(admin::delete_kit),
        )
        .route("/api/admin/kits/{kit_id}/test", post(admin::test_existing_kit))
        .route("/api/patterns/repeated-drones", get(patterns::repeated_drones))
        .route("/api/patterns/coordinated", get(patterns::coordinated))
        .route("/api/patterns/pilot-reuse", get(patterns::pilot_reuse))
        .route("/api/patterns/anomalies", get(patterns::anomalies))
        .route("/api/patterns/multi-kit", get(patterns::multi_kit))
        .route("/api/patterns/security-alerts", get(patterns::security_alerts))
        .route("/api/patterns/loitering", get(patterns::loitering))
        .route("/api/patterns/rapid-descent", get(patterns::rapid_descent))
        .route("/api/patterns/night-activity", get(patterns::night_activity))
        .route(
            "/api/analysis/estimate-location/{drone_id}",
            get(analysis::estimate_location),
        )
        .with_state(state)
}
