// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Health supervisor.
//!
//! Periodic sweep over all kits: recompute status from `last_seen` with the
//! shared boundary function, persist changes, and refresh the registry
//! snapshot the read API serves from.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use skywarden::kit_health::{KitStatus, StatusThresholds};
use skywarden_store::Writer;

use crate::registry::Registry;

/// Run the sweep loop until shutdown.
pub async fn run(
    registry: Arc<Registry>,
    writer: Writer,
    thresholds: StatusThresholds,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                tracing::info!("supervisor stopping");
                return;
            }
        }

        sweep(&registry, &writer, &thresholds).await;
    }
}

/// One pass: derive each kit's status and persist the ones that moved.
async fn sweep(registry: &Registry, writer: &Writer, thresholds: &StatusThresholds) {
    let now = Utc::now();
    let kits = registry.kits();
    let mut changed = 0usize;

    for kit in kits.iter() {
        let since_seen = kit
            .last_seen
            .map(|seen| (now - seen).num_milliseconds().max(0) as f64 / 1000.0);
        let status = KitStatus::classify_secs(since_seen, thresholds);

        if kit.status != status.as_str() {
            if let Err(err) = writer.set_kit_status(&kit.kit_id, status.as_str()).await {
                tracing::warn!(kit_id = %kit.kit_id, error = %err, "status update failed");
                continue;
            }
            tracing::info!(
                kit_id = %kit.kit_id,
                from = %kit.status,
                to = status.as_str(),
                "kit status changed"
            );
            changed += 1;
        }
    }

    if let Err(err) = registry.refresh().await {
        tracing::warn!(error = %err, "registry refresh failed");
    }
    if changed > 0 {
        tracing::debug!(changed, total = kits.len(), "supervisor sweep complete");
    }
}
