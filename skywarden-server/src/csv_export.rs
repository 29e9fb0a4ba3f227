// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Streaming CSV export of the track query.
//!
//! Pages through the store behind a chunked response body; the whole result
//! is never buffered. Zero matching rows still return 200 with the header
//! line.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::Response;
use chrono::{SecondsFormat, Utc};
use tokio_stream::wrappers::ReceiverStream;

use skywarden::records::TrackRecord;
use skywarden_store::queries::{ExportCursor, TrackQuery};
use skywarden_store::Repository;

use crate::error::ApiError;
use crate::params::TrackParams;
use crate::state::SharedState;

/// Fixed export column order.
const COLUMNS: [&str; 22] = [
    "time", "kit_id", "drone_id", "lat", "lon", "alt", "speed", "heading", "pilot_lat",
    "pilot_lon", "home_lat", "home_lon", "mac", "rssi", "freq", "ua_type", "operator_id",
    "caa_id", "rid_make", "rid_model", "rid_source", "track_type",
];

/// Rows fetched per page while streaming.
const PAGE_SIZE: i64 = 5000;

/// GET /api/export/csv
pub async fn export_csv(
    State(state): State<SharedState>,
    Query(params): Query<TrackParams>,
) -> Result<Response, ApiError> {
    // The export walks the raw window; limit and dedup do not apply.
    let mut query = params.to_query(1000)?;
    query.deduplicate = false;

    let filename = format!(
        "skywarden_drones_{}.csv",
        Utc::now().format("%Y%m%d_%H%M%S")
    );

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<u8>, std::io::Error>>(4);
    tokio::spawn(stream_pages(state.repo.clone(), query, tx));

    let body = Body::from_stream(ReceiverStream::new(rx));
    Response::builder()
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={filename}"),
        )
        .body(body)
        .map_err(|err| {
            tracing::error!(error = %err, "export response build failed");
            ApiError::unavailable("Export failed")
        })
}

/// Producer task: header first, then one chunk per page until the window is
/// exhausted. A store failure mid-stream truncates the download; the error
/// is logged server-side.
async fn stream_pages(
    repo: Repository,
    query: TrackQuery,
    tx: tokio::sync::mpsc::Sender<Result<Vec<u8>, std::io::Error>>,
) {
    if tx.send(Ok(header_chunk())).await.is_err() {
        return;
    }

    let mut cursor: Option<ExportCursor> = None;
    loop {
        let page = match repo.export_page(&query, cursor.as_ref(), PAGE_SIZE).await {
            Ok(page) => page,
            Err(err) => {
                tracing::error!(error = %err, "export page fetch failed, stream truncated");
                return;
            }
        };
        let Some(last) = page.last() else {
            return;
        };
        cursor = Some(ExportCursor::from_row(last));

        let chunk = rows_chunk(&page);
        let finished = (page.len() as i64) < PAGE_SIZE;
        if tx.send(Ok(chunk)).await.is_err() || finished {
            return;
        }
    }
}

fn header_chunk() -> Vec<u8> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    // Writing the header cannot fail into a Vec.
    let _ = writer.write_record(COLUMNS);
    writer.into_inner().unwrap_or_default()
}

fn rows_chunk(rows: &[TrackRecord]) -> Vec<u8> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        let record = [
            row.time.to_rfc3339_opts(SecondsFormat::Micros, true),
            row.kit_id.clone(),
            row.drone_id.clone(),
            opt_float(row.lat),
            opt_float(row.lon),
            opt_float(row.alt),
            opt_float(row.speed),
            opt_float(row.heading),
            opt_float(row.pilot_lat),
            opt_float(row.pilot_lon),
            opt_float(row.home_lat),
            opt_float(row.home_lon),
            row.mac.clone().unwrap_or_default(),
            row.rssi.map(|v| v.to_string()).unwrap_or_default(),
            opt_float(row.freq),
            row.ua_type.clone().unwrap_or_default(),
            row.operator_id.clone().unwrap_or_default(),
            row.caa_id.clone().unwrap_or_default(),
            row.rid_make.clone().unwrap_or_default(),
            row.rid_model.clone().unwrap_or_default(),
            row.rid_source.clone().unwrap_or_default(),
            row.track_type.clone(),
        ];
        let _ = writer.write_record(&record);
    }
    writer.into_inner().unwrap_or_default()
}

fn opt_float(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
