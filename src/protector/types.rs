// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Protected data, grants and consumption payloads.
//!
//! Field names follow the gateway's camelCase wire format.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Identities
// =============================================================================

/// A wallet address or an ENS name.
///
/// Grants name their user and application either way, e.g.
/// `0x7f...` or `web3mail.apps.iexec.eth`. ENS names are compared
/// case-insensitively and stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AddressOrEnsName {
    Address(Address),
    Ens(String),
}

impl AddressOrEnsName {
    pub fn as_address(&self) -> Option<&Address> {
        match self {
            AddressOrEnsName::Address(address) => Some(address),
            AddressOrEnsName::Ens(_) => None,
        }
    }
}

impl FromStr for AddressOrEnsName {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        if value.is_empty() {
            return Err("address or ENS name is empty".to_string());
        }

        if value.starts_with("0x") || value.starts_with("0X") {
            return Address::from_str(value)
                .map(AddressOrEnsName::Address)
                .map_err(|e| format!("invalid address `{value}`: {e}"));
        }

        let name = value.to_ascii_lowercase();
        let valid_labels = name.split('.').all(|label| {
            !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });
        if name.contains('.') && valid_labels {
            Ok(AddressOrEnsName::Ens(name))
        } else {
            Err(format!("`{value}` is neither an address nor an ENS name"))
        }
    }
}

impl TryFrom<String> for AddressOrEnsName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AddressOrEnsName> for String {
    fn from(value: AddressOrEnsName) -> Self {
        value.to_string()
    }
}

impl From<Address> for AddressOrEnsName {
    fn from(value: Address) -> Self {
        AddressOrEnsName::Address(value)
    }
}

impl fmt::Display for AddressOrEnsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressOrEnsName::Address(address) => write!(f, "{address}"),
            AddressOrEnsName::Ens(name) => f.write_str(name),
        }
    }
}

// =============================================================================
// Protected Data
// =============================================================================

/// Shape of the protected payload: field name to type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DataSchema {
    pub email: String,
}

impl DataSchema {
    /// Schema of a protected email address.
    pub fn email() -> Self {
        Self {
            email: "string".to_string(),
        }
    }
}

/// A protected data record as listed by the gateway.
///
/// Immutable once created; only its grants change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedDataRecord {
    /// Content address assigned by the service
    #[serde(alias = "address")]
    #[schema(value_type = String)]
    pub id: Address,
    #[schema(value_type = String)]
    pub owner: Address,
    pub name: String,
    pub schema: DataSchema,
    pub created_at: DateTime<Utc>,
}

/// Payload of a protect call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectParams {
    pub owner: Address,
    pub name: String,
    pub data: EmailData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailData {
    pub email: String,
}

// =============================================================================
// Grants
// =============================================================================

/// Opaque grant identifier (dataset order hash on the gateway side).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct GrantId(pub String);

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authorization for one (user, app) pair to consume a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    #[schema(value_type = String)]
    pub protected_data_id: Address,
    #[schema(value_type = String)]
    pub authorized_user: AddressOrEnsName,
    #[schema(value_type = String)]
    pub authorized_app: AddressOrEnsName,
    pub remaining_uses: u32,
    pub grant_id: GrantId,
}

impl AccessGrant {
    /// Whether this grant covers the given triple.
    pub fn covers(
        &self,
        protected_data: &Address,
        user: &AddressOrEnsName,
        app: &AddressOrEnsName,
    ) -> bool {
        &self.protected_data_id == protected_data
            && &self.authorized_user == user
            && &self.authorized_app == app
    }
}

/// Payload of a grant call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessParams {
    pub protected_data: Address,
    pub authorized_user: AddressOrEnsName,
    pub authorized_app: AddressOrEnsName,
    pub number_of_access: u32,
}

/// Optional filters of a grant listing. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protected_data: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_user: Option<AddressOrEnsName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_app: Option<AddressOrEnsName>,
}

impl GrantFilter {
    /// Filter on one exact (record, user, app) triple.
    pub fn triple(protected_data: Address, user: AddressOrEnsName, app: AddressOrEnsName) -> Self {
        Self {
            protected_data: Some(protected_data),
            authorized_user: Some(user),
            authorized_app: Some(app),
        }
    }

    pub fn matches(&self, grant: &AccessGrant) -> bool {
        self.protected_data
            .as_ref()
            .is_none_or(|id| id == &grant.protected_data_id)
            && self
                .authorized_user
                .as_ref()
                .is_none_or(|user| user == &grant.authorized_user)
            && self
                .authorized_app
                .as_ref()
                .is_none_or(|app| app == &grant.authorized_app)
    }
}

/// Result of a grant listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantedAccessList {
    pub count: usize,
    #[serde(rename = "grantedAccess", alias = "grants")]
    pub grants: Vec<AccessGrant>,
}

/// Result of a revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeReceipt {
    pub grant_id: GrantId,
    pub tx_hash: String,
}

// =============================================================================
// Consumption
// =============================================================================

/// A record the current user may consume, with the state of their grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessibleRecord {
    pub record: ProtectedDataRecord,
    pub remaining_uses: u32,
    pub access_granted_at: DateTime<Utc>,
}

/// Email sent to the owner of a protected address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub subject: String,
    pub content: String,
    pub sender_name: String,
}

/// Payload of a consumption call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeParams {
    pub protected_data: Address,
    pub consumer: Address,
    pub authorized_app: AddressOrEnsName,
    pub message: EmailMessage,
}

/// Acknowledgement of a consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeAck {
    pub task_id: String,
}
