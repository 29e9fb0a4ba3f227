// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Shared application state handed to every handler.

use std::sync::Arc;
use std::time::Instant;

use skywarden::kit_health::StatusThresholds;
use skywarden::pathloss::PathLoss;
use skywarden_ingest::{IngestStats, Registry};
use skywarden_store::{PgPool, Repository, Writer};

/// Everything a handler can reach. One value, built in `main`, no hidden
/// globals.
pub struct AppState {
    pub pool: PgPool,
    pub repo: Repository,
    pub writer: Writer,
    pub registry: Arc<Registry>,
    pub probe_client: reqwest::Client,
    pub thresholds: StatusThresholds,
    pub pathloss: PathLoss,
    pub stats: Arc<IngestStats>,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;
