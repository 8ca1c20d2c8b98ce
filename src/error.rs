// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy of the access lifecycle and its HTTP rendering.
//!
//! [`AccessError`] is what the core returns. Local validation failures are
//! kept apart from remote failures so a client knows whether resubmitting
//! needs a new network round-trip. Remote messages are carried verbatim.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::blockchain::WalletError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// Rejected locally, before any remote call
    #[error("{0}")]
    Validation(String),

    #[error("Wallet provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Switching or adding the required network failed
    #[error("Network switch failed: {0}")]
    Network(WalletError),

    #[error("Protection failed: {0}")]
    Protection(String),

    #[error("Grant failed: {0}")]
    Grant(String),

    #[error("Revocation failed: {0}")]
    Revocation(String),

    #[error("Consumption failed: {0}")]
    Consumption(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl AccessError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Validation(_) => "validation_error",
            AccessError::ProviderUnavailable(_) => "provider_unavailable",
            AccessError::Network(_) => "network_error",
            AccessError::Protection(_) => "protection_error",
            AccessError::Grant(_) => "grant_error",
            AccessError::Revocation(_) => "revocation_error",
            AccessError::Consumption(_) => "consumption_error",
            AccessError::Permission(_) => "permission_error",
            AccessError::NotFound(_) => "not_found",
            AccessError::DirectoryUnavailable(_) => "directory_unavailable",
            AccessError::Registration(_) => "registration_error",
            AccessError::Cancelled => "cancelled",
        }
    }

    /// True when the error was produced without touching the network.
    pub fn is_local(&self) -> bool {
        matches!(self, AccessError::Validation(_))
    }

    /// True when the pipeline stopped before its external call started.
    ///
    /// Such failures leave lifecycle state untouched.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            AccessError::Validation(_) | AccessError::ProviderUnavailable(_) | AccessError::Network(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AccessError::Validation(_) => StatusCode::BAD_REQUEST,
            AccessError::Permission(_) => StatusCode::FORBIDDEN,
            AccessError::NotFound(_) => StatusCode::NOT_FOUND,
            AccessError::Network(_) | AccessError::Cancelled => StatusCode::CONFLICT,
            AccessError::ProviderUnavailable(_) | AccessError::DirectoryUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AccessError::Protection(_)
            | AccessError::Grant(_)
            | AccessError::Revocation(_)
            | AccessError::Consumption(_)
            | AccessError::Registration(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub local: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
    local: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            local: false,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            local: true,
            ..Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        Self {
            status: err.status_code(),
            code: err.code(),
            local: err.is_local(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
            local: self.local,
        });
        (self.status, body).into_response()
    }
}
