// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Read-side repository.
//!
//! Thin SQL layer the API handlers and the pattern engine pull rows from.
//! Filters are composed with `QueryBuilder`; all pattern logic lives in the
//! core crate, not in SQL.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use skywarden::records::{SignalRecord, TrackRecord};
use skywarden::timerange::TimeRange;

use crate::error::{Result, StoreError};
use crate::models::{Kit, KitPollStatus, TrackCounts, TrackPoint};

/// Column list shared by every track select.
const TRACK_COLUMNS: &str = "time, kit_id, drone_id, lat, lon, alt, speed, heading, \
     vspeed, height, direction, op_status, runtime, id_type, ua_type, operator_id, \
     caa_id, rid_make, rid_model, rid_source, pilot_lat, pilot_lon, home_lat, home_lon, \
     mac, rssi, freq, track_type";

/// Filterable track query.
#[derive(Debug, Clone)]
pub struct TrackQuery {
    pub range: TimeRange,
    pub kit_ids: Option<Vec<String>>,
    pub rid_make: Option<String>,
    pub track_type: Option<String>,
    pub limit: i64,
    /// Return only the most recent row per drone id
    pub deduplicate: bool,
}

/// Resume position for the export pagination.
#[derive(Debug, Clone)]
pub struct ExportCursor {
    pub time: DateTime<Utc>,
    pub kit_id: String,
    pub drone_id: String,
}

impl ExportCursor {
    pub fn from_row(row: &TrackRecord) -> Self {
        Self {
            time: row.time,
            kit_id: row.kit_id.clone(),
            drone_id: row.drone_id.clone(),
        }
    }
}

/// Filterable signal query.
#[derive(Debug, Clone)]
pub struct SignalQuery {
    pub range: TimeRange,
    pub kit_ids: Option<Vec<String>>,
    pub detection_type: Option<String>,
    pub limit: i64,
}

/// Read repository over the shared pool.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // -- Kits ---------------------------------------------------------------

    /// All registered kits, ordered by name.
    pub async fn list_kits(&self) -> Result<Vec<Kit>> {
        let kits = sqlx::query_as::<_, Kit>(
            "SELECT kit_id, name, location, api_url, source, status, enabled, last_seen, created_at \
             FROM kits ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(kits)
    }

    pub async fn get_kit(&self, kit_id: &str) -> Result<Kit> {
        sqlx::query_as::<_, Kit>(
            "SELECT kit_id, name, location, api_url, source, status, enabled, last_seen, created_at \
             FROM kits WHERE kit_id = $1",
        )
        .bind(kit_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::KitNotFound(kit_id.to_string()))
    }

    /// Kits the HTTP collector should poll: enabled, with an API URL.
    pub async fn pollable_kits(&self) -> Result<Vec<Kit>> {
        let kits = sqlx::query_as::<_, Kit>(
            "SELECT kit_id, name, location, api_url, source, status, enabled, last_seen, created_at \
             FROM kits \
             WHERE enabled AND api_url IS NOT NULL AND source IN ('http', 'both') \
             ORDER BY kit_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(kits)
    }

    /// Polling overview for the admin reload-status endpoint.
    pub async fn poll_status(&self) -> Result<Vec<KitPollStatus>> {
        let rows = sqlx::query_as::<_, KitPollStatus>(
            "SELECT kit_id, name, api_url, status, enabled, last_seen FROM kits ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- Tracks -------------------------------------------------------------

    /// Track query with filters and the optional per-drone dedup switch.
    pub async fn query_tracks(&self, query: &TrackQuery) -> Result<Vec<TrackRecord>> {
        let mut qb: QueryBuilder<Postgres> = if query.deduplicate {
            QueryBuilder::new(format!(
                "SELECT DISTINCT ON (drone_id) {TRACK_COLUMNS} FROM drones WHERE time >= "
            ))
        } else {
            QueryBuilder::new(format!("SELECT {TRACK_COLUMNS} FROM drones WHERE time >= "))
        };
        push_track_filters(&mut qb, query);

        if query.deduplicate {
            qb.push(" ORDER BY drone_id, time DESC");
        } else {
            qb.push(" ORDER BY time DESC");
        }
        qb.push(" LIMIT ");
        qb.push_bind(query.limit);

        let rows = qb.build_query_as::<TrackRecord>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Raw and unique counts for the same filter set, ignoring limit and
    /// dedup.
    pub async fn track_counts(&self, query: &TrackQuery) -> Result<TrackCounts> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) AS total_detections, COUNT(DISTINCT drone_id) AS unique_drones \
             FROM drones WHERE time >= ",
        );
        push_track_filters(&mut qb, query);

        let counts = qb
            .build_query_as::<TrackCounts>()
            .fetch_one(&self.pool)
            .await?;
        Ok(counts)
    }

    /// One page of the CSV export, keyset-paginated backwards over the full
    /// composite key so tied timestamps are neither skipped nor repeated.
    pub async fn export_page(
        &self,
        query: &TrackQuery,
        cursor: Option<&ExportCursor>,
        page_size: i64,
    ) -> Result<Vec<TrackRecord>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {TRACK_COLUMNS} FROM drones WHERE time >= "));
        push_track_filters(&mut qb, query);
        if let Some(cursor) = cursor {
            qb.push(" AND (time, kit_id, drone_id) < (");
            qb.push_bind(cursor.time);
            qb.push(", ");
            qb.push_bind(cursor.kit_id.clone());
            qb.push(", ");
            qb.push_bind(cursor.drone_id.clone());
            qb.push(")");
        }
        qb.push(" ORDER BY time DESC, kit_id DESC, drone_id DESC LIMIT ");
        qb.push_bind(page_size);

        let rows = qb.build_query_as::<TrackRecord>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Flight path points for one drone, chronological.
    pub async fn drone_track(
        &self,
        drone_id: &str,
        range: &TimeRange,
        limit: i64,
    ) -> Result<Vec<TrackPoint>> {
        let points = sqlx::query_as::<_, TrackPoint>(
            r#"
            SELECT time, kit_id, lat, lon, alt, speed, heading, rssi
            FROM drones
            WHERE drone_id = $1
              AND time >= $2 AND time <= $3
              AND lat IS NOT NULL AND lon IS NOT NULL
            ORDER BY time ASC
            LIMIT $4
            "#,
        )
        .bind(drone_id)
        .bind(range.start)
        .bind(range.end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(points)
    }

    /// Every track row in a window; the pattern engine's feed.
    pub async fn tracks_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TrackRecord>> {
        let rows = sqlx::query_as::<_, TrackRecord>(&format!(
            "SELECT {TRACK_COLUMNS} FROM drones WHERE time >= $1 AND time <= $2 \
             ORDER BY time ASC LIMIT $3"
        ))
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// All sightings of one drone in a window, newest first. Feed for the
    /// location estimator.
    pub async fn drone_observations(
        &self,
        drone_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TrackRecord>> {
        let rows = sqlx::query_as::<_, TrackRecord>(&format!(
            "SELECT {TRACK_COLUMNS} FROM drones \
             WHERE drone_id = $1 AND time >= $2 AND time <= $3 \
             ORDER BY time DESC"
        ))
        .bind(drone_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// The kit's reported position nearest to `target` within the window,
    /// from its health telemetry. (0, 0) counts as not reported.
    pub async fn kit_position_near(
        &self,
        kit_id: &str,
        target: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(f64, f64)>> {
        let row: Option<(f64, f64)> = sqlx::query_as(
            r#"
            SELECT lat, lon
            FROM system_health
            WHERE kit_id = $1
              AND time >= $2 AND time <= $3
              AND lat IS NOT NULL AND lon IS NOT NULL
              AND NOT (lat = 0 AND lon = 0)
            ORDER BY ABS(EXTRACT(EPOCH FROM (time - $4)))
            LIMIT 1
            "#,
        )
        .bind(kit_id)
        .bind(start)
        .bind(end)
        .bind(target)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // -- Signals ------------------------------------------------------------

    /// Signal query with filters.
    pub async fn query_signals(&self, query: &SignalQuery) -> Result<Vec<SignalRecord>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT time, kit_id, freq_mhz, power_dbm, bandwidth_mhz, lat, lon, alt, \
             detection_type, pal_conf, ntsc_conf, source, signal_type \
             FROM signals WHERE time >= ",
        );
        qb.push_bind(query.range.start);
        qb.push(" AND time <= ");
        qb.push_bind(query.range.end);
        if let Some(kits) = &query.kit_ids {
            qb.push(" AND kit_id = ANY(");
            qb.push_bind(kits.clone());
            qb.push(")");
        }
        if let Some(detection_type) = &query.detection_type {
            qb.push(" AND detection_type = ");
            qb.push_bind(detection_type.clone());
        }
        qb.push(" ORDER BY time DESC LIMIT ");
        qb.push_bind(query.limit);

        let rows = qb
            .build_query_as::<SignalRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Append the window and optional filters; the builder must end right after
/// `WHERE time >= `.
fn push_track_filters(qb: &mut QueryBuilder<Postgres>, query: &TrackQuery) {
    qb.push_bind(query.range.start);
    qb.push(" AND time <= ");
    qb.push_bind(query.range.end);
    if let Some(kits) = &query.kit_ids {
        qb.push(" AND kit_id = ANY(");
        qb.push_bind(kits.clone());
        qb.push(")");
    }
    if let Some(rid_make) = &query.rid_make {
        qb.push(" AND rid_make = ");
        qb.push_bind(rid_make.clone());
    }
    if let Some(track_type) = &query.track_type {
        qb.push(" AND track_type = ");
        qb.push_bind(track_type.clone());
    }
}
