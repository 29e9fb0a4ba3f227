// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fan-in channel in front of the persistence writer.
//!
//! Every ingest task hands batches to one bounded channel; awaiting a full
//! channel is the backpressure pause that slows polling and bus consumption
//! when the store falls behind. The task drains the channel completely
//! before exiting, so dropping the senders is the graceful-shutdown drain.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use skywarden::records::{HealthRecord, KitUpsert, SignalRecord, TrackRecord};
use skywarden_store::Writer;

/// One unit of write work.
#[derive(Debug)]
pub enum WriteBatch {
    Tracks(Vec<TrackRecord>),
    Signals(Vec<SignalRecord>),
    Health(Vec<HealthRecord>),
    /// Upsert a kit (auto-registration)
    Kit(KitUpsert),
    /// Advance a kit's last_seen
    Touch {
        kit_id: String,
        seen_at: DateTime<Utc>,
    },
}

/// Spawn the writer task. The returned sender is cloned into every ingest
/// task; the task ends once all senders are dropped and the queue is dry.
pub fn spawn_writer(
    writer: Writer,
    capacity: usize,
) -> (mpsc::Sender<WriteBatch>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(run(writer, rx));
    (tx, handle)
}

async fn run(writer: Writer, mut rx: mpsc::Receiver<WriteBatch>) {
    while let Some(batch) = rx.recv().await {
        apply(&writer, batch).await;
    }
    tracing::info!("writer task drained and stopped");
}

/// Apply one batch. Exhausted-retry store errors drop the batch and keep
/// the pipeline alive; the keys make any later replay idempotent.
async fn apply(writer: &Writer, batch: WriteBatch) {
    let result = match batch {
        WriteBatch::Tracks(records) => writer
            .insert_tracks(&records)
            .await
            .map(|outcome| log_outcome("tracks", outcome)),
        WriteBatch::Signals(records) => writer
            .insert_signals(&records)
            .await
            .map(|outcome| log_outcome("signals", outcome)),
        WriteBatch::Health(records) => writer
            .insert_health(&records)
            .await
            .map(|outcome| log_outcome("health", outcome)),
        WriteBatch::Kit(kit) => writer.upsert_kit(&kit).await,
        WriteBatch::Touch { kit_id, seen_at } => writer.touch_kit(&kit_id, seen_at).await,
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "write batch dropped");
    }
}

fn log_outcome(stream: &str, outcome: skywarden_store::BatchOutcome) {
    if outcome.rejected > 0 {
        tracing::warn!(
            stream,
            inserted = outcome.inserted,
            conflicted = outcome.conflicted,
            rejected = outcome.rejected,
            "batch stored with rejects"
        );
    } else {
        tracing::debug!(
            stream,
            inserted = outcome.inserted,
            conflicted = outcome.conflicted,
            "batch stored"
        );
    }
}
