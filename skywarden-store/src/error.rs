// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Store error types.

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Main error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Retries over a transient failure were exhausted
    #[error("Store unavailable after {attempts} attempts: {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    /// Lookup for a kit that does not exist
    #[error("Kit not found: {0}")]
    KitNotFound(String),

    /// Create collided with an existing kit id or URL
    #[error("Kit already exists with ID: {0}")]
    DuplicateKit(String),

    /// Schema migration failed; the process must not partial-start
    #[error("Schema migration failed at step '{step}': {source}")]
    Migration {
        step: String,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    /// Whether the underlying failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(err) => is_transient_sqlx(err),
            Self::Unavailable { .. } => true,
            _ => false,
        }
    }
}

/// Connection-level failures are transient; statement-level failures
/// (constraint violations, bad data) are not.
pub(crate) fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
    )
}

/// Postgres unique-violation SQLSTATE.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
