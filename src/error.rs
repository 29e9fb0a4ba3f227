//! Error types for the Skywarden core
//!
//! This module defines the error types shared across the core crate.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, SkywardenError>;

/// Main error type for core operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkywardenError {
    /// A query parameter failed validation
    #[error("Invalid parameter '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },

    /// A time-range token could not be parsed
    #[error("Invalid time range '{0}': expected 1h, 24h, 7d, Nh, Nd, or custom:START,END")]
    InvalidTimeRange(String),

    /// The estimator was given no usable observations
    #[error("No observations with kit positions available for estimation")]
    NoObservations,

    /// A bus payload could not be normalised
    #[error("Malformed payload on topic '{topic}': {reason}")]
    MalformedPayload { topic: String, reason: String },
}

impl SkywardenError {
    /// Shorthand for parameter validation failures.
    pub fn invalid_parameter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
