// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. Responses that come straight
//! from the core (`ProtectOutcome`, `NetworkState`, ...) are serialized as
//! is; this module only holds what the HTTP surface adds.
//!
//! Identities arrive as strings and are parsed here so that a malformed
//! address is a `400` before any wallet or gateway call.
//!
//! ## Model Categories
//!
//! - **Network**: wallet account and chain state
//! - **Protected data**: protect requests and registration
//! - **Grants**: grant, list and revoke requests
//! - **Consumption**: email sending

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::blockchain::NetworkState;
use crate::error::ApiError;
use crate::protector::{AddressOrEnsName, GrantId};

/// Parse an optional address or ENS name from a request field.
pub fn parse_identity(field: &str, raw: Option<&str>) -> Result<Option<AddressOrEnsName>, ApiError> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<AddressOrEnsName>()
                .map_err(|e| ApiError::bad_request(format!("{field}: {e}")))
        })
        .transpose()
}

/// Parse a required address or ENS name from a request field.
pub fn require_identity(field: &str, raw: &str) -> Result<AddressOrEnsName, ApiError> {
    parse_identity(field, Some(raw))?.ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

// =============================================================================
// Network
// =============================================================================

/// Connected wallet as seen by the service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    #[schema(value_type = Option<String>)]
    pub account: Option<Address>,
    pub network: NetworkState,
    /// Whether the backend registry knows the account
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered: Option<bool>,
}

// =============================================================================
// Protected Data
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProtectRequest {
    /// Email address to protect
    pub email: String,
    /// Display name of the record
    #[serde(default)]
    pub name: Option<String>,
}

// =============================================================================
// Grants
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    /// Address or ENS name of the user receiving access
    pub authorized_user: String,
    /// Application allowed to consume; the configured mail app if omitted
    #[serde(default)]
    pub authorized_app: Option<String>,
    /// Number of uses, at least 1
    #[serde(default)]
    pub number_of_access: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub authorized_user: String,
    #[serde(default)]
    pub authorized_app: Option<String>,
    /// Grant to revoke when several match
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub grant_id: Option<GrantId>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct GrantQuery {
    /// Only grants of this user
    pub authorized_user: Option<String>,
    /// Only grants for this app
    pub authorized_app: Option<String>,
}

// =============================================================================
// Consumption
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ContactsQuery {
    /// User whose contacts to list; the connected account if omitted
    pub user: Option<String>,
}
