// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! API error envelope.
//!
//! Every failure leaves the server as `{"detail": "..."}` with a stable
//! status code: 400 for bad parameters, 404 for missing things, 409 for
//! duplicates, 503 when the store is unreachable.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use skywarden::SkywardenError;
use skywarden_store::StoreError;

/// An error ready to be serialised to the client.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::KitNotFound(kit_id) => Self::not_found(format!("Kit not found: {kit_id}")),
            StoreError::DuplicateKit(kit_id) => {
                Self::conflict(format!("Kit already exists with ID: {kit_id}"))
            }
            StoreError::Unavailable { .. } => Self::unavailable("Database unavailable"),
            _ => {
                tracing::error!(error = %err, "store error");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: err.to_string(),
                }
            }
        }
    }
}

impl From<SkywardenError> for ApiError {
    fn from(err: SkywardenError) -> Self {
        match &err {
            SkywardenError::NoObservations => Self::not_found(err.to_string()),
            _ => Self::bad_request(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: ApiError = StoreError::KitNotFound("kit-x".to_string()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.detail.contains("kit-x"));

        let err: ApiError = StoreError::DuplicateKit("kit-y".to_string()).into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_core_error_mapping() {
        let err: ApiError = SkywardenError::NoObservations.into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = SkywardenError::InvalidTimeRange("x".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
