// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Ingest error types.

use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Main error type for ingest operations
#[derive(Error, Debug)]
pub enum IngestError {
    /// Store failure surfaced through the writer
    #[error("Store error: {0}")]
    Store(#[from] skywarden_store::StoreError),

    /// HTTP fetch failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Kit endpoint answered with a non-success status
    #[error("Kit returned HTTP {status} for {endpoint}")]
    BadStatus { endpoint: String, status: u16 },

    /// MQTT client-side failure
    #[error("MQTT client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),

    /// MQTT connection failure
    #[error("MQTT connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),

    /// Kit list file could not be read
    #[error("Failed to read kit file {path}: {source}")]
    KitFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Kit list file could not be parsed
    #[error("Malformed kit file {path}: {source}")]
    KitFileParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The writer channel is gone; the process is shutting down
    #[error("Writer channel closed")]
    WriterGone,
}
