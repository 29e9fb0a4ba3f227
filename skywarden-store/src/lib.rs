// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! TimescaleDB persistence for Skywarden.
//!
//! - [`schema`]: Idempotent migrations, hypertables, continuous aggregates,
//!   retention and compression policies, applied at startup
//! - [`writer`]: The sole mutation path: batched idempotent inserts, kit
//!   upserts, and admin CRUD
//! - [`queries`]: The read-side repository the API and pattern engine pull
//!   windowed rows from
//! - [`models`]: Store-side row types that are not ingest records

pub mod error;
pub mod models;
pub mod queries;
pub mod schema;
pub mod writer;

pub use error::{Result, StoreError};
pub use models::{Kit, TrackPoint};
pub use queries::Repository;
pub use writer::{BatchOutcome, Writer};

use sqlx::postgres::PgPoolOptions;
pub use sqlx::PgPool;
use std::time::Duration;

/// Connect a pool to the store.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(2)
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Liveness probe used by `/health`.
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
