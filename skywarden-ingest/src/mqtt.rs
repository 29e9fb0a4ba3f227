// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Push-based bus subscriber.
//!
//! Subscribes to the kit bus topics, normalises the broadcast field names
//! into writer records, auto-registers kits on first sight, and reconnects
//! with capped backoff when the broker drops. Malformed messages bump a
//! counter and are dropped; they never restart the subscriber.

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use chrono::Utc;
use skywarden::normalize;
use skywarden::records::KitUpsert;

use crate::stats::IngestStats;
use crate::writer_task::WriteBatch;

/// Topic surface of the kit bus.
#[derive(Debug, Clone)]
pub struct MqttTopics {
    /// Aggregate drone list
    pub drones: String,
    /// Per-drone sub-topics, subscribed as `{prefix}#`
    pub drone_prefix: String,
    /// ADS-B aircraft
    pub aircraft: String,
    /// FPV signal detections
    pub signals: String,
    /// System health, JSON on the `/attrs` sub-topic
    pub system: String,
}

impl Default for MqttTopics {
    fn default() -> Self {
        Self {
            drones: "wardragon/drones".to_string(),
            drone_prefix: "wardragon/drone/".to_string(),
            aircraft: "wardragon/aircraft".to_string(),
            signals: "wardragon/signals".to_string(),
            system: "wardragon/system".to_string(),
        }
    }
}

/// Broker connection configuration.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub topics: MqttTopics,
    /// Reconnect backoff floor
    pub reconnect_min: Duration,
    /// Reconnect backoff ceiling
    pub reconnect_max: Duration,
    /// Interval for the periodic stats line
    pub stats_interval: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            use_tls: false,
            topics: MqttTopics::default(),
            reconnect_min: Duration::from_secs(5),
            reconnect_max: Duration::from_secs(60),
            stats_interval: Duration::from_secs(60),
        }
    }
}

/// The bus subscriber task.
pub struct MqttIngest {
    config: MqttConfig,
    writer_tx: mpsc::Sender<WriteBatch>,
    stats: Arc<IngestStats>,
    shutdown: watch::Receiver<bool>,
    /// Kits already auto-registered this session
    known_kits: HashSet<String>,
}

impl MqttIngest {
    pub fn new(
        config: MqttConfig,
        writer_tx: mpsc::Sender<WriteBatch>,
        stats: Arc<IngestStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            writer_tx,
            stats,
            shutdown,
            known_kits: HashSet::new(),
        }
    }

    /// Run until shutdown. Each broker session subscribes the full topic
    /// surface; lost connections retry with doubled delay up to the cap.
    pub async fn run(mut self) {
        let mut reconnect_delay = self.config.reconnect_min;
        let mut stats_tick = tokio::time::interval(self.config.stats_interval);
        stats_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let (client, mut eventloop) = self.connect();
            if let Err(err) = self.subscribe(&client).await {
                tracing::error!(error = %err, "subscribe failed");
            }

            loop {
                tokio::select! {
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            tracing::info!(host = %self.config.host, port = self.config.port, "connected to broker");
                            reconnect_delay = self.config.reconnect_min;
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.handle_message(&publish.topic, &publish.payload).await;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "broker connection lost");
                            break;
                        }
                    },
                    _ = stats_tick.tick() => self.log_stats(),
                    _ = self.shutdown.changed() => {
                        tracing::info!("bus subscriber stopping");
                        return;
                    }
                }
            }

            tracing::info!(delay_secs = reconnect_delay.as_secs(), "reconnecting to broker");
            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                _ = self.shutdown.changed() => return,
            }
            reconnect_delay = (reconnect_delay * 2).min(self.config.reconnect_max);
        }
    }

    fn connect(&self) -> (AsyncClient, rumqttc::EventLoop) {
        let client_id = format!("skywarden-ingest-{}", std::process::id());
        let mut options = MqttOptions::new(client_id, &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            options.set_credentials(user, pass);
        }
        if self.config.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        AsyncClient::new(options, 64)
    }

    async fn subscribe(&self, client: &AsyncClient) -> Result<(), rumqttc::ClientError> {
        let topics = &self.config.topics;
        // Only the JSON-bearing topics; availability/state publish plain
        // strings and are filtered again per message.
        let subscriptions = [
            topics.drones.clone(),
            format!("{}#", topics.drone_prefix),
            topics.aircraft.clone(),
            topics.signals.clone(),
            format!("{}/attrs", topics.system),
        ];
        for topic in subscriptions {
            client.subscribe(&topic, QoS::AtMostOnce).await?;
            tracing::info!(topic, "subscribed");
        }
        Ok(())
    }

    /// Route one message. Any failure here is counted and dropped.
    async fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        if topic.contains("availability") || topic.ends_with("/state") {
            return;
        }

        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(err) => {
                self.stats.bump_errors();
                let digest = String::from_utf8_lossy(&payload[..payload.len().min(80)]).to_string();
                tracing::warn!(topic, error = %err, digest, "malformed bus payload dropped");
                return;
            }
        };

        let kit_id = match first_kit_id(&value) {
            Some(kit_id) => kit_id,
            None => {
                self.stats.bump_errors();
                tracing::debug!(topic, "message without kit attribution dropped");
                return;
            }
        };

        self.register_kit(&kit_id).await;

        let received_at = Utc::now();
        let topics = self.config.topics.clone();

        if topic == topics.drones || topic.starts_with(&topics.drone_prefix) {
            let tracks: Vec<_> = normalize::payload_items(&value, "drones")
                .into_iter()
                .map(|item| normalize::drone_from_json(&kit_id, item, received_at))
                .collect();
            self.stats.add_drones(tracks.len());
            self.send(WriteBatch::Tracks(tracks)).await;
        } else if topic == topics.aircraft {
            let tracks: Vec<_> = normalize::payload_items(&value, "aircraft")
                .into_iter()
                .map(|item| normalize::aircraft_from_json(&kit_id, item, received_at))
                .collect();
            self.stats.add_aircraft(tracks.len());
            self.send(WriteBatch::Tracks(tracks)).await;
        } else if topic == topics.signals {
            let records: Vec<_> = normalize::payload_items(&value, "signals")
                .into_iter()
                .filter_map(|item| normalize::signal_from_json(&kit_id, item, received_at))
                .collect();
            self.stats.add_signals(records.len());
            self.send(WriteBatch::Signals(records)).await;
        } else if topic == format!("{}/attrs", topics.system) {
            let record = normalize::health_from_json(&kit_id, &value, received_at);
            self.stats.add_health(1);
            self.send(WriteBatch::Health(vec![record])).await;
            self.send(WriteBatch::Touch {
                kit_id: kit_id.clone(),
                seen_at: received_at,
            })
            .await;
        } else {
            tracing::debug!(topic, "unhandled topic");
        }
    }

    /// Auto-register a kit the first time it publishes. An existing HTTP
    /// kit is promoted to hybrid by the writer's source lattice.
    async fn register_kit(&mut self, kit_id: &str) {
        if self.known_kits.contains(kit_id) {
            return;
        }
        self.known_kits.insert(kit_id.to_string());
        tracing::info!(kit_id, "auto-registering bus kit");
        self.send(WriteBatch::Kit(KitUpsert::from_bus(kit_id))).await;
    }

    /// Hand a batch to the writer channel. Awaiting a full channel is the
    /// backpressure pause before the next message is consumed.
    async fn send(&self, batch: WriteBatch) {
        if self.writer_tx.send(batch).await.is_err() {
            tracing::debug!("writer channel closed, dropping batch");
        }
    }

    fn log_stats(&self) {
        let snapshot = self.stats.snapshot();
        tracing::info!(
            drones = snapshot.drones_received,
            aircraft = snapshot.aircraft_received,
            signals = snapshot.signals_received,
            health = snapshot.health_received,
            errors = snapshot.errors,
            known_kits = self.known_kits.len(),
            "bus ingest stats"
        );
    }
}

/// Kit attribution for an aggregate payload: for arrays, the first element
/// that carries one wins.
fn first_kit_id(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(normalize::extract_kit_id),
        _ => normalize::extract_kit_id(value),
    }
}
