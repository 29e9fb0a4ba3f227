// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Pull-based HTTP collector.
//!
//! One independent polling loop per enabled HTTP-source kit. Each tick
//! fetches the kit's `drones`, `signals`, and `status` endpoints
//! concurrently, normalises the payloads, hands the batches to the writer
//! channel, and sleeps the backoff-adjusted poll delay. A kit's failures
//! never touch another kit's loop.
//!
//! The outer loop re-reads the kit set periodically and starts or stops
//! per-kit loops to follow admin and config changes.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use skywarden::kit_health::{KitHealth, PollPolicy, StatusThresholds};
use skywarden::normalize;
use skywarden::retry::{FailureKind, RetrySchedule};
use skywarden_store::Repository;

use crate::error::IngestError;
use crate::stats::IngestStats;
use crate::writer_task::WriteBatch;

/// Collector configuration; defaults follow the env surface.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub poll: PollPolicy,
    pub thresholds: StatusThresholds,
    pub retry: RetrySchedule,
    /// How often the kit set is re-read for added/removed/disabled kits
    pub reload_interval: Duration,
    /// Grace period for loops to finish on shutdown
    pub shutdown_grace: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            thresholds: StatusThresholds::default(),
            retry: RetrySchedule::default(),
            reload_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// A running per-kit loop.
struct KitTask {
    api_url: String,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The collector supervisor: owns the per-kit loops.
pub struct Collector {
    client: reqwest::Client,
    repo: Repository,
    writer_tx: mpsc::Sender<WriteBatch>,
    stats: Arc<IngestStats>,
    config: CollectorConfig,
    shutdown: watch::Receiver<bool>,
}

impl Collector {
    pub fn new(
        client: reqwest::Client,
        repo: Repository,
        writer_tx: mpsc::Sender<WriteBatch>,
        stats: Arc<IngestStats>,
        config: CollectorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            repo,
            writer_tx,
            stats,
            config,
            shutdown,
        }
    }

    /// Run until the shutdown signal flips. Reconciles the running loops
    /// with the stored kit set every reload interval.
    pub async fn run(mut self) {
        let mut tasks: HashMap<String, KitTask> = HashMap::new();

        loop {
            match self.repo.pollable_kits().await {
                Ok(kits) => self.reconcile(&mut tasks, kits),
                Err(err) => tracing::warn!(error = %err, "kit reload failed, keeping current set"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.reload_interval) => {}
                _ = self.shutdown.changed() => break,
            }
        }

        // Stop all loops and join within the grace period.
        for task in tasks.values() {
            let _ = task.stop.send(true);
        }
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        for (kit_id, task) in tasks.drain() {
            if tokio::time::timeout_at(deadline, task.handle).await.is_err() {
                tracing::warn!(kit_id, "kit loop did not stop within grace, aborting");
            }
        }
        tracing::info!("collector stopped");
    }

    /// Start loops for new kits, stop loops for removed or disabled kits,
    /// restart loops whose URL changed.
    fn reconcile(&self, tasks: &mut HashMap<String, KitTask>, kits: Vec<skywarden_store::Kit>) {
        let wanted: HashMap<String, String> = kits
            .into_iter()
            .filter_map(|kit| Some((kit.kit_id, kit.api_url?)))
            .collect();

        tasks.retain(|kit_id, task| {
            let keep = wanted.get(kit_id) == Some(&task.api_url) && !task.handle.is_finished();
            if !keep {
                tracing::info!(kit_id, "stopping kit loop");
                let _ = task.stop.send(true);
            }
            keep
        });

        for (kit_id, api_url) in wanted {
            if tasks.contains_key(&kit_id) {
                continue;
            }
            tracing::info!(kit_id, api_url, "starting kit loop");
            let (stop_tx, stop_rx) = watch::channel(false);
            let loop_ctx = KitLoop {
                kit_id: kit_id.clone(),
                api_url: api_url.clone(),
                client: self.client.clone(),
                writer_tx: self.writer_tx.clone(),
                stats: Arc::clone(&self.stats),
                poll: self.config.poll,
                retry: self.config.retry.clone(),
                stop: stop_rx,
            };
            let handle = tokio::spawn(loop_ctx.run());
            tasks.insert(
                kit_id,
                KitTask {
                    api_url,
                    stop: stop_tx,
                    handle,
                },
            );
        }
    }
}

/// One kit's polling loop.
struct KitLoop {
    kit_id: String,
    api_url: String,
    client: reqwest::Client,
    writer_tx: mpsc::Sender<WriteBatch>,
    stats: Arc<IngestStats>,
    poll: PollPolicy,
    retry: RetrySchedule,
    stop: watch::Receiver<bool>,
}

impl KitLoop {
    async fn run(mut self) {
        let mut health = KitHealth::new();
        let mut stop = self.stop.clone();

        loop {
            // Cancellation aborts an in-flight fetch, not just the sleep.
            let tick_ok = tokio::select! {
                ok = self.tick() => ok,
                _ = stop.changed() => {
                    tracing::debug!(kit_id = %self.kit_id, "kit loop stopping mid-tick");
                    return;
                }
            };
            let now = Instant::now();
            if tick_ok {
                health.record_success(now);
            } else {
                health.record_failure(now);
                if health.consecutive_failures == 1 {
                    tracing::warn!(kit_id = %self.kit_id, "kit poll failing");
                }
            }

            let delay = health.poll_delay(&self.poll);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop.changed() => {
                    tracing::debug!(kit_id = %self.kit_id, "kit loop stopping");
                    return;
                }
            }
        }
    }

    /// One poll tick: fetch the three endpoints concurrently, normalise,
    /// and hand off. Endpoint failures are isolated; the tick succeeds if
    /// any endpoint produced data.
    async fn tick(&mut self) -> bool {
        let (drones, signals, status) = tokio::join!(
            self.fetch_json("drones"),
            self.fetch_json("signals"),
            self.fetch_json("status"),
        );

        let received_at = Utc::now();
        let mut any_ok = false;

        match drones {
            Ok(payload) => {
                any_ok = true;
                let tracks: Vec<_> = normalize::payload_items(&payload, "drones")
                    .into_iter()
                    .map(|item| normalize::drone_from_json(&self.kit_id, item, received_at))
                    .collect();
                if !tracks.is_empty() {
                    self.stats.add_drones(tracks.len());
                    if self.writer_tx.send(WriteBatch::Tracks(tracks)).await.is_err() {
                        return false;
                    }
                }
            }
            Err(err) => self.note_endpoint_error("drones", err),
        }

        match signals {
            Ok(payload) => {
                any_ok = true;
                let records: Vec<_> = normalize::payload_items(&payload, "signals")
                    .into_iter()
                    .filter_map(|item| normalize::signal_from_json(&self.kit_id, item, received_at))
                    .collect();
                if !records.is_empty() {
                    self.stats.add_signals(records.len());
                    if self.writer_tx.send(WriteBatch::Signals(records)).await.is_err() {
                        return false;
                    }
                }
            }
            Err(err) => self.note_endpoint_error("signals", err),
        }

        match status {
            Ok(payload) => {
                any_ok = true;
                let record = normalize::health_from_json(&self.kit_id, &payload, received_at);
                self.stats.add_health(1);
                if self
                    .writer_tx
                    .send(WriteBatch::Health(vec![record]))
                    .await
                    .is_err()
                {
                    return false;
                }
            }
            Err(err) => self.note_endpoint_error("status", err),
        }

        if any_ok {
            // Successful contact advances the kit's last_seen.
            let touched = self
                .writer_tx
                .send(WriteBatch::Touch {
                    kit_id: self.kit_id.clone(),
                    seen_at: received_at,
                })
                .await;
            if touched.is_err() {
                return false;
            }
        }

        any_ok
    }

    fn note_endpoint_error(&self, endpoint: &str, err: IngestError) {
        self.stats.bump_errors();
        tracing::debug!(kit_id = %self.kit_id, endpoint, error = %err, "endpoint fetch failed");
    }

    /// Fetch one endpoint with the short in-tick retry schedule. Retries
    /// apply to timeouts, connection failures, and 5xx; a 4xx fails the
    /// fetch immediately.
    async fn fetch_json(&self, endpoint: &str) -> Result<Value, IngestError> {
        let url = format!("{}/{}", self.api_url, endpoint);
        let mut attempt = 0usize;

        loop {
            let failure = match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if response.status().is_success() {
                        return Ok(response.json::<Value>().await?);
                    }
                    (
                        FailureKind::from_status(status),
                        IngestError::BadStatus {
                            endpoint: endpoint.to_string(),
                            status,
                        },
                    )
                }
                Err(err) => {
                    let kind = if err.is_timeout() || err.is_connect() || err.is_request() {
                        FailureKind::Transient
                    } else {
                        FailureKind::Permanent
                    };
                    (kind, IngestError::Http(err))
                }
            };

            let (kind, err) = failure;
            if !kind.is_retriable() {
                return Err(err);
            }
            match self.retry.delay_for_attempt(attempt) {
                Some(delay) => {
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            }
        }
    }
}
