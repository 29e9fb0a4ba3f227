// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Ingestion pipelines for Skywarden.
//!
//! Two concurrent paths converge on one persistence writer:
//!
//! - [`collector`]: pull-based, one polling loop per enabled HTTP kit
//! - [`mqtt`]: push-based, one subscriber over the kit bus topics
//!
//! Plus the shared plumbing:
//!
//! - [`writer_task`]: the bounded-channel fan-in in front of the store
//!   writer; the channel bound is the backpressure mechanism
//! - [`registry`]: the logical kit set (YAML config, admin CRUD,
//!   auto-registration) and its copy-on-update snapshot
//! - [`supervisor`]: the periodic status sweep
//! - [`stats`]: process-wide ingest counters

pub mod collector;
pub mod error;
pub mod mqtt;
pub mod registry;
pub mod stats;
pub mod supervisor;
pub mod writer_task;

pub use collector::{Collector, CollectorConfig};
pub use error::{IngestError, Result};
pub use mqtt::{MqttConfig, MqttIngest, MqttTopics};
pub use registry::{KitFileEntry, KitTestResult, Registry};
pub use stats::{IngestStats, StatsSnapshot};
pub use writer_task::{spawn_writer, WriteBatch};
