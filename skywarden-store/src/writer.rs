// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! The persistence writer: the sole path that mutates the store.
//!
//! Batch inserts are idempotent via composite-key conflict ignore, report
//! per-row outcomes, and never abort a batch for one bad row. Transient
//! store failures are retried with capped exponential backoff before being
//! surfaced; the caller decides whether to requeue.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgQueryResult;
use sqlx::PgPool;
use std::time::Duration;

use skywarden::records::{HealthRecord, KitUpsert, SignalRecord, TrackRecord};

use crate::error::{is_transient_sqlx, is_unique_violation, Result, StoreError};

/// Per-row outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows newly stored
    pub inserted: usize,
    /// Rows whose composite key already existed (idempotent replay)
    pub conflicted: usize,
    /// Rows rejected by the schema; logged and skipped
    pub rejected: usize,
}

impl BatchOutcome {
    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Inserted => self.inserted += 1,
            RowOutcome::Conflicted => self.conflicted += 1,
            RowOutcome::Rejected => self.rejected += 1,
        }
    }
}

/// Fate of a single row within a batch.
enum RowOutcome {
    Inserted,
    Conflicted,
    Rejected,
}

/// Retry policy for transient store failures.
#[derive(Debug, Clone, Copy)]
struct WriteRetry {
    attempts: u32,
    base_delay: Duration,
}

impl Default for WriteRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Batched idempotent writer over a shared pool.
///
/// Safe for concurrent use from many ingestion tasks; correctness under
/// interleaving comes from the composite keys, not from serialization.
#[derive(Debug, Clone)]
pub struct Writer {
    pool: PgPool,
    retry: WriteRetry,
}

impl Writer {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: WriteRetry::default(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a batch of track rows. Conflicts on `(time, kit_id, drone_id)`
    /// are silently ignored.
    pub async fn insert_tracks(&self, records: &[TrackRecord]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for record in records {
            outcome.record(self.with_retry(|| self.insert_track_row(record)).await?);
        }
        Ok(outcome)
    }

    /// Insert a batch of signal rows keyed by `(time, kit_id, freq_mhz)`.
    pub async fn insert_signals(&self, records: &[SignalRecord]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for record in records {
            outcome.record(self.with_retry(|| self.insert_signal_row(record)).await?);
        }
        Ok(outcome)
    }

    /// Insert a batch of health rows keyed by `(time, kit_id)`.
    pub async fn insert_health(&self, records: &[HealthRecord]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for record in records {
            outcome.record(self.with_retry(|| self.insert_health_row(record)).await?);
        }
        Ok(outcome)
    }

    /// Insert a kit if absent, otherwise update exactly the provided fields
    /// (last-writer-wins). `source` moves along the monotone lattice: once a
    /// kit has been seen on both paths it stays `both`.
    pub async fn upsert_kit(&self, kit: &KitUpsert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kits (kit_id, name, location, api_url, source, status, enabled, created_at, last_seen)
            VALUES ($1, $2, $3, $4, $5, 'unknown', COALESCE($6, TRUE), NOW(), NOW())
            ON CONFLICT (kit_id) DO UPDATE SET
                name     = COALESCE(EXCLUDED.name, kits.name),
                location = COALESCE(EXCLUDED.location, kits.location),
                api_url  = COALESCE(EXCLUDED.api_url, kits.api_url),
                enabled  = COALESCE($6, kits.enabled),
                source   = CASE
                               WHEN kits.source = EXCLUDED.source THEN kits.source
                               ELSE 'both'
                           END
            "#,
        )
        .bind(&kit.kit_id)
        .bind(&kit.name)
        .bind(&kit.location)
        .bind(&kit.api_url)
        .bind(kit.source.as_str())
        .bind(kit.enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Advance a kit's `last_seen`, never moving it backwards.
    pub async fn touch_kit(&self, kit_id: &str, seen_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE kits SET last_seen = GREATEST(COALESCE(last_seen, $2), $2) WHERE kit_id = $1",
        )
        .bind(kit_id)
        .bind(seen_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a supervisor-computed status.
    pub async fn set_kit_status(&self, kit_id: &str, status: &str) -> Result<()> {
        sqlx::query("UPDATE kits SET status = $2 WHERE kit_id = $1")
            .bind(kit_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Admin CRUD ---------------------------------------------------------

    /// Create a kit explicitly. Clears any tombstone left by a prior admin
    /// delete. Fails with [`StoreError::DuplicateKit`] when the id or URL is
    /// already registered.
    pub async fn create_kit(&self, kit: &KitUpsert, status: &str) -> Result<()> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT kit_id FROM kits WHERE kit_id = $1 OR (api_url IS NOT NULL AND api_url = $2)")
                .bind(&kit.kit_id)
                .bind(&kit.api_url)
                .fetch_optional(&self.pool)
                .await?;
        if let Some((id,)) = existing {
            return Err(StoreError::DuplicateKit(id));
        }

        sqlx::query("DELETE FROM kit_tombstones WHERE kit_id = $1")
            .bind(&kit.kit_id)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO kits (kit_id, name, location, api_url, source, status, enabled, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, TRUE), NOW())
            "#,
        )
        .bind(&kit.kit_id)
        .bind(kit.name.as_deref().unwrap_or(&kit.kit_id))
        .bind(&kit.location)
        .bind(&kit.api_url)
        .bind(kit.source.as_str())
        .bind(status)
        .bind(kit.enabled)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::DuplicateKit(kit.kit_id.clone())
            } else {
                StoreError::Database(err)
            }
        })?;
        Ok(())
    }

    /// Partial update; `None` fields are left untouched.
    pub async fn update_kit(
        &self,
        kit_id: &str,
        name: Option<&str>,
        location: Option<&str>,
        api_url: Option<&str>,
        enabled: Option<bool>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE kits SET
                name     = COALESCE($2, name),
                location = COALESCE($3, location),
                api_url  = COALESCE($4, api_url),
                enabled  = COALESCE($5, enabled)
            WHERE kit_id = $1
            "#,
        )
        .bind(kit_id)
        .bind(name)
        .bind(location)
        .bind(api_url)
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::KitNotFound(kit_id.to_string()));
        }
        Ok(())
    }

    /// Delete a kit, optionally cascading its telemetry, and leave a
    /// tombstone so the config loader cannot resurrect it.
    pub async fn delete_kit(&self, kit_id: &str, delete_data: bool) -> Result<DeletedData> {
        let exists: Option<(String,)> = sqlx::query_as("SELECT kit_id FROM kits WHERE kit_id = $1")
            .bind(kit_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(StoreError::KitNotFound(kit_id.to_string()));
        }

        let mut deleted = DeletedData::default();
        if delete_data {
            deleted.tracks = sqlx::query("DELETE FROM drones WHERE kit_id = $1")
                .bind(kit_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
            deleted.signals = sqlx::query("DELETE FROM signals WHERE kit_id = $1")
                .bind(kit_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
            deleted.health_records = sqlx::query("DELETE FROM system_health WHERE kit_id = $1")
                .bind(kit_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
        }

        sqlx::query("DELETE FROM kits WHERE kit_id = $1")
            .bind(kit_id)
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "INSERT INTO kit_tombstones (kit_id) VALUES ($1) ON CONFLICT (kit_id) DO NOTHING",
        )
        .bind(kit_id)
        .execute(&self.pool)
        .await?;

        Ok(deleted)
    }

    /// Register a kit from the YAML config. Tombstoned kits are skipped and
    /// existing rows are never overwritten, so config cannot clobber admin
    /// edits. Returns whether a row was created.
    pub async fn register_config_kit(&self, kit: &KitUpsert) -> Result<bool> {
        let tombstoned: Option<(String,)> =
            sqlx::query_as("SELECT kit_id FROM kit_tombstones WHERE kit_id = $1")
                .bind(&kit.kit_id)
                .fetch_optional(&self.pool)
                .await?;
        if tombstoned.is_some() {
            tracing::info!(kit_id = %kit.kit_id, "config kit skipped: deleted by admin");
            return Ok(false);
        }

        let done = sqlx::query(
            r#"
            INSERT INTO kits (kit_id, name, location, api_url, source, status, enabled, created_at)
            VALUES ($1, $2, $3, $4, $5, 'unknown', COALESCE($6, TRUE), NOW())
            ON CONFLICT (kit_id) DO NOTHING
            "#,
        )
        .bind(&kit.kit_id)
        .bind(kit.name.as_deref().unwrap_or(&kit.kit_id))
        .bind(&kit.location)
        .bind(&kit.api_url)
        .bind(kit.source.as_str())
        .bind(kit.enabled)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    // -- Row inserts --------------------------------------------------------

    async fn insert_track_row(
        &self,
        record: &TrackRecord,
    ) -> std::result::Result<PgQueryResult, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO drones (
                time, kit_id, drone_id, lat, lon, alt, speed, heading,
                vspeed, height, direction, op_status, runtime, id_type,
                ua_type, operator_id, caa_id, rid_make, rid_model, rid_source,
                pilot_lat, pilot_lon, home_lat, home_lon, mac, rssi, freq, track_type
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8,
                $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20,
                $21, $22, $23, $24, $25, $26, $27, $28
            )
            ON CONFLICT (time, kit_id, drone_id) DO NOTHING
            "#,
        )
        .bind(record.time)
        .bind(&record.kit_id)
        .bind(&record.drone_id)
        .bind(record.lat)
        .bind(record.lon)
        .bind(record.alt)
        .bind(record.speed)
        .bind(record.heading)
        .bind(record.vspeed)
        .bind(record.height)
        .bind(record.direction)
        .bind(&record.op_status)
        .bind(record.runtime)
        .bind(&record.id_type)
        .bind(&record.ua_type)
        .bind(&record.operator_id)
        .bind(&record.caa_id)
        .bind(&record.rid_make)
        .bind(&record.rid_model)
        .bind(&record.rid_source)
        .bind(record.pilot_lat)
        .bind(record.pilot_lon)
        .bind(record.home_lat)
        .bind(record.home_lon)
        .bind(&record.mac)
        .bind(record.rssi)
        .bind(record.freq)
        .bind(&record.track_type)
        .execute(&self.pool)
        .await
    }

    async fn insert_signal_row(
        &self,
        record: &SignalRecord,
    ) -> std::result::Result<PgQueryResult, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO signals (
                time, kit_id, freq_mhz, power_dbm, bandwidth_mhz,
                lat, lon, alt, detection_type, pal_conf, ntsc_conf,
                source, signal_type
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (time, kit_id, freq_mhz) DO NOTHING
            "#,
        )
        .bind(record.time)
        .bind(&record.kit_id)
        .bind(record.freq_mhz)
        .bind(record.power_dbm)
        .bind(record.bandwidth_mhz)
        .bind(record.lat)
        .bind(record.lon)
        .bind(record.alt)
        .bind(&record.detection_type)
        .bind(record.pal_conf)
        .bind(record.ntsc_conf)
        .bind(&record.source)
        .bind(&record.signal_type)
        .execute(&self.pool)
        .await
    }

    async fn insert_health_row(
        &self,
        record: &HealthRecord,
    ) -> std::result::Result<PgQueryResult, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO system_health (
                time, kit_id, lat, lon, alt,
                cpu_percent, memory_percent, disk_percent,
                uptime_hours, temp_cpu, temp_gpu,
                pluto_temp, zynq_temp, speed, track, gps_fix
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (time, kit_id) DO NOTHING
            "#,
        )
        .bind(record.time)
        .bind(&record.kit_id)
        .bind(record.lat)
        .bind(record.lon)
        .bind(record.alt)
        .bind(record.cpu_percent)
        .bind(record.memory_percent)
        .bind(record.disk_percent)
        .bind(record.uptime_hours)
        .bind(record.temp_cpu)
        .bind(record.temp_gpu)
        .bind(record.pluto_temp)
        .bind(record.zynq_temp)
        .bind(record.speed)
        .bind(record.track)
        .bind(record.gps_fix)
        .execute(&self.pool)
        .await
    }

    /// Run one row insert with transient-failure retries. A non-transient
    /// error rejects the row; exhausted retries surface as
    /// [`StoreError::Unavailable`] and abort the batch.
    async fn with_retry<F, Fut>(&self, mut op: F) -> Result<RowOutcome>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<PgQueryResult, sqlx::Error>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(done) if done.rows_affected() > 0 => return Ok(RowOutcome::Inserted),
                Ok(_) => return Ok(RowOutcome::Conflicted),
                Err(err) if is_transient_sqlx(&err) => {
                    attempt += 1;
                    if attempt >= self.retry.attempts {
                        return Err(StoreError::Unavailable {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    let delay = self.retry.base_delay * 2u32.pow(attempt - 1);
                    tracing::warn!(attempt, error = %err, "transient store error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    // Data error on a single row: skip it, keep the batch moving.
                    tracing::warn!(error = %err, "row rejected");
                    return Ok(RowOutcome::Rejected);
                }
            }
        }
    }
}

/// Cascade counts from a kit delete.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct DeletedData {
    pub tracks: u64,
    pub signals: u64,
    pub health_records: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_outcome_counting() {
        let mut outcome = BatchOutcome::default();
        outcome.record(RowOutcome::Inserted);
        outcome.record(RowOutcome::Inserted);
        outcome.record(RowOutcome::Conflicted);
        outcome.record(RowOutcome::Rejected);

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.conflicted, 1);
        assert_eq!(outcome.rejected, 1);
    }

    #[test]
    fn test_retry_delays_double() {
        let retry = WriteRetry::default();
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.base_delay * 2u32.pow(0), Duration::from_millis(100));
        assert_eq!(retry.base_delay * 2u32.pow(1), Duration::from_millis(200));
    }
}
