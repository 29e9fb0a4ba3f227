// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Schema management.
//!
//! Ensures the four base relations, the hypertables, the hourly continuous
//! aggregates, and the retention/compression policies exist before anything
//! is served. Every statement is idempotent (`CREATE ... IF NOT EXISTS`,
//! `ADD COLUMN IF NOT EXISTS`, `if_not_exists => TRUE`), so this is safe to
//! run on every startup against any prior schema version.

use sqlx::PgPool;

use crate::error::{Result, StoreError};

/// Apply the full schema. Fails fast on the first broken step; the caller
/// must treat that as fatal (no partial start).
pub async fn apply(pool: &PgPool) -> Result<()> {
    for (step, sql) in STEPS {
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|source| StoreError::Migration {
                step: (*step).to_string(),
                source,
            })?;
        tracing::debug!(step, "schema step applied");
    }
    tracing::info!(steps = STEPS.len(), "schema up to date");
    Ok(())
}

/// Ordered migration steps. New steps append; existing steps never change
/// meaning, only grow guards.
const STEPS: &[(&str, &str)] = &[
    (
        "create_kits",
        r#"
        CREATE TABLE IF NOT EXISTS kits (
            kit_id      TEXT PRIMARY KEY,
            name        TEXT,
            location    TEXT,
            api_url     TEXT,
            source      TEXT NOT NULL DEFAULT 'http'
                        CHECK (source IN ('http', 'mqtt', 'both')),
            status      TEXT NOT NULL DEFAULT 'unknown',
            enabled     BOOLEAN NOT NULL DEFAULT TRUE,
            created_at  TIMESTAMPTZ DEFAULT NOW(),
            last_seen   TIMESTAMPTZ
        );
        "#,
    ),
    (
        "kits_source_column",
        "ALTER TABLE kits ADD COLUMN IF NOT EXISTS source TEXT NOT NULL DEFAULT 'http';",
    ),
    (
        "kits_enabled_column",
        "ALTER TABLE kits ADD COLUMN IF NOT EXISTS enabled BOOLEAN NOT NULL DEFAULT TRUE;",
    ),
    (
        "kits_source_index",
        "CREATE INDEX IF NOT EXISTS idx_kits_source ON kits (source);",
    ),
    (
        "create_kit_tombstones",
        r#"
        CREATE TABLE IF NOT EXISTS kit_tombstones (
            kit_id     TEXT PRIMARY KEY,
            deleted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    ),
    (
        "create_drones",
        r#"
        CREATE TABLE IF NOT EXISTS drones (
            time        TIMESTAMPTZ NOT NULL,
            kit_id      TEXT NOT NULL,
            drone_id    TEXT NOT NULL,
            lat         DOUBLE PRECISION,
            lon         DOUBLE PRECISION,
            alt         DOUBLE PRECISION,
            speed       DOUBLE PRECISION,
            heading     DOUBLE PRECISION,
            vspeed      DOUBLE PRECISION,
            height      DOUBLE PRECISION,
            direction   DOUBLE PRECISION,
            op_status   TEXT,
            runtime     BIGINT,
            id_type     TEXT,
            ua_type     TEXT,
            operator_id TEXT,
            caa_id      TEXT,
            rid_make    TEXT,
            rid_model   TEXT,
            rid_source  TEXT,
            pilot_lat   DOUBLE PRECISION,
            pilot_lon   DOUBLE PRECISION,
            home_lat    DOUBLE PRECISION,
            home_lon    DOUBLE PRECISION,
            mac         TEXT,
            rssi        INTEGER,
            freq        DOUBLE PRECISION,
            track_type  TEXT NOT NULL DEFAULT 'drone',
            PRIMARY KEY (time, kit_id, drone_id)
        );
        "#,
    ),
    (
        "drones_hypertable",
        "SELECT create_hypertable('drones', 'time', if_not_exists => TRUE, migrate_data => TRUE);",
    ),
    (
        "drones_drone_id_index",
        "CREATE INDEX IF NOT EXISTS idx_drones_drone_id_time ON drones (drone_id, time DESC);",
    ),
    (
        "drones_kit_id_index",
        "CREATE INDEX IF NOT EXISTS idx_drones_kit_id_time ON drones (kit_id, time DESC);",
    ),
    (
        "create_signals",
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            time           TIMESTAMPTZ NOT NULL,
            kit_id         TEXT NOT NULL,
            freq_mhz       DOUBLE PRECISION NOT NULL,
            power_dbm      DOUBLE PRECISION,
            bandwidth_mhz  DOUBLE PRECISION,
            lat            DOUBLE PRECISION,
            lon            DOUBLE PRECISION,
            alt            DOUBLE PRECISION,
            detection_type TEXT,
            pal_conf       DOUBLE PRECISION,
            ntsc_conf      DOUBLE PRECISION,
            source         TEXT,
            signal_type    TEXT,
            PRIMARY KEY (time, kit_id, freq_mhz)
        );
        "#,
    ),
    (
        "signals_hypertable",
        "SELECT create_hypertable('signals', 'time', if_not_exists => TRUE, migrate_data => TRUE);",
    ),
    (
        "signals_kit_id_index",
        "CREATE INDEX IF NOT EXISTS idx_signals_kit_id_time ON signals (kit_id, time DESC);",
    ),
    (
        "create_system_health",
        r#"
        CREATE TABLE IF NOT EXISTS system_health (
            time           TIMESTAMPTZ NOT NULL,
            kit_id         TEXT NOT NULL,
            lat            DOUBLE PRECISION,
            lon            DOUBLE PRECISION,
            alt            DOUBLE PRECISION,
            cpu_percent    DOUBLE PRECISION,
            memory_percent DOUBLE PRECISION,
            disk_percent   DOUBLE PRECISION,
            uptime_hours   DOUBLE PRECISION,
            temp_cpu       DOUBLE PRECISION,
            temp_gpu       DOUBLE PRECISION,
            pluto_temp     DOUBLE PRECISION,
            zynq_temp      DOUBLE PRECISION,
            speed          DOUBLE PRECISION,
            track          DOUBLE PRECISION,
            gps_fix        BOOLEAN,
            PRIMARY KEY (time, kit_id)
        );
        "#,
    ),
    (
        "system_health_hypertable",
        "SELECT create_hypertable('system_health', 'time', if_not_exists => TRUE, migrate_data => TRUE);",
    ),
    (
        "system_health_kit_id_index",
        "CREATE INDEX IF NOT EXISTS idx_system_health_kit_id_time ON system_health (kit_id, time DESC);",
    ),
    // Hourly rollups. The manufacturer breakdown is the rid_make grouping;
    // the FPV sub-band split uses the 5.8 GHz analog band edges.
    (
        "drones_hourly_aggregate",
        r#"
        CREATE MATERIALIZED VIEW IF NOT EXISTS drones_hourly
        WITH (timescaledb.continuous) AS
        SELECT
            time_bucket('1 hour', time) AS bucket,
            kit_id,
            rid_make,
            COUNT(DISTINCT drone_id) FILTER (WHERE track_type = 'drone') AS unique_drones,
            COUNT(DISTINCT drone_id) FILTER (WHERE track_type = 'aircraft') AS unique_aircraft,
            COUNT(*) AS total_detections,
            AVG(alt) AS avg_alt,
            MAX(alt) AS max_alt,
            AVG(speed) AS avg_speed,
            MAX(speed) AS max_speed
        FROM drones
        GROUP BY bucket, kit_id, rid_make
        WITH NO DATA;
        "#,
    ),
    (
        "drones_hourly_refresh_policy",
        r#"
        SELECT add_continuous_aggregate_policy('drones_hourly',
            start_offset => INTERVAL '3 hours',
            end_offset => INTERVAL '1 hour',
            schedule_interval => INTERVAL '1 hour',
            if_not_exists => TRUE);
        "#,
    ),
    (
        "signals_hourly_aggregate",
        r#"
        CREATE MATERIALIZED VIEW IF NOT EXISTS signals_hourly
        WITH (timescaledb.continuous) AS
        SELECT
            time_bucket('1 hour', time) AS bucket,
            kit_id,
            detection_type,
            COUNT(*) AS total_detections,
            COUNT(DISTINCT freq_mhz) AS unique_frequencies,
            AVG(power_dbm) AS avg_power_dbm,
            MAX(power_dbm) AS max_power_dbm,
            COUNT(*) FILTER (WHERE freq_mhz >= 5645 AND freq_mhz < 5740) AS band_a_count,
            COUNT(*) FILTER (WHERE freq_mhz >= 5740 AND freq_mhz < 5840) AS band_b_count,
            COUNT(*) FILTER (WHERE freq_mhz >= 5840 AND freq_mhz < 5945) AS band_c_count
        FROM signals
        GROUP BY bucket, kit_id, detection_type
        WITH NO DATA;
        "#,
    ),
    (
        "signals_hourly_refresh_policy",
        r#"
        SELECT add_continuous_aggregate_policy('signals_hourly',
            start_offset => INTERVAL '3 hours',
            end_offset => INTERVAL '1 hour',
            schedule_interval => INTERVAL '1 hour',
            if_not_exists => TRUE);
        "#,
    ),
    // Retention: 30 days of raw tracks and signals, 90 days of health,
    // one year of rollups.
    (
        "drones_retention",
        "SELECT add_retention_policy('drones', INTERVAL '30 days', if_not_exists => TRUE);",
    ),
    (
        "signals_retention",
        "SELECT add_retention_policy('signals', INTERVAL '30 days', if_not_exists => TRUE);",
    ),
    (
        "system_health_retention",
        "SELECT add_retention_policy('system_health', INTERVAL '90 days', if_not_exists => TRUE);",
    ),
    (
        "drones_hourly_retention",
        "SELECT add_retention_policy('drones_hourly', INTERVAL '1 year', if_not_exists => TRUE);",
    ),
    (
        "signals_hourly_retention",
        "SELECT add_retention_policy('signals_hourly', INTERVAL '1 year', if_not_exists => TRUE);",
    ),
    // Compression after 7 days, segmented for the common query axes.
    (
        "drones_compression",
        r#"
        ALTER TABLE drones SET (
            timescaledb.compress,
            timescaledb.compress_segmentby = 'kit_id, drone_id'
        );
        "#,
    ),
    (
        "drones_compression_policy",
        "SELECT add_compression_policy('drones', INTERVAL '7 days', if_not_exists => TRUE);",
    ),
    (
        "signals_compression",
        r#"
        ALTER TABLE signals SET (
            timescaledb.compress,
            timescaledb.compress_segmentby = 'kit_id'
        );
        "#,
    ),
    (
        "signals_compression_policy",
        "SELECT add_compression_policy('signals', INTERVAL '7 days', if_not_exists => TRUE);",
    ),
    (
        "system_health_compression",
        r#"
        ALTER TABLE system_health SET (
            timescaledb.compress,
            timescaledb.compress_segmentby = 'kit_id'
        );
        "#,
    ),
    (
        "system_health_compression_policy",
        "SELECT add_compression_policy('system_health', INTERVAL '7 days', if_not_exists => TRUE);",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_have_unique_names() {
        let mut names: Vec<&str> = STEPS.iter().map(|(name, _)| *name).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before);
    }

    #[test]
    fn test_steps_are_guarded() {
        // Every CREATE carries an existence guard so reruns are no-ops.
        for (name, sql) in STEPS {
            if sql.contains("CREATE TABLE") || sql.contains("CREATE INDEX") {
                assert!(sql.contains("IF NOT EXISTS"), "unguarded step {name}");
            }
            if sql.contains("ADD COLUMN") {
                assert!(sql.contains("IF NOT EXISTS"), "unguarded step {name}");
            }
            if sql.contains("add_retention_policy")
                || sql.contains("add_compression_policy")
                || sql.contains("add_continuous_aggregate_policy")
                || sql.contains("create_hypertable")
            {
                assert!(sql.contains("if_not_exists => TRUE"), "unguarded step {name}");
            }
        }
    }
}
