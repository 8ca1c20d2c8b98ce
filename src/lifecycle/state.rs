// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Lifecycle states of a protected data record.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AccessError;

/// Identifies one lifecycle.
///
/// A protect submission has no record address until the gateway answers, so
/// it runs under a draft id. Everything else is keyed by the record address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LifecycleKey {
    Draft(Uuid),
    Record(Address),
}

impl LifecycleKey {
    pub fn draft() -> Self {
        LifecycleKey::Draft(Uuid::new_v4())
    }
}

impl From<Address> for LifecycleKey {
    fn from(address: Address) -> Self {
        LifecycleKey::Record(address)
    }
}

impl fmt::Display for LifecycleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleKey::Draft(id) => write!(f, "draft:{id}"),
            LifecycleKey::Record(address) => write!(f, "{address}"),
        }
    }
}

impl FromStr for LifecycleKey {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        if let Some(draft) = value.strip_prefix("draft:") {
            return Uuid::parse_str(draft)
                .map(LifecycleKey::Draft)
                .map_err(|e| format!("invalid draft id `{draft}`: {e}"));
        }
        Address::from_str(value)
            .map(LifecycleKey::Record)
            .map_err(|e| format!("invalid protected data address `{value}`: {e}"))
    }
}

impl TryFrom<String> for LifecycleKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LifecycleKey> for String {
    fn from(key: LifecycleKey) -> Self {
        key.to_string()
    }
}

/// Why a pipeline ended in [`LifecycleState::Failed`], with the remote
/// message as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    Protection(String),
    Grant(String),
    Revocation(String),
    Consumption(String),
    Permission(String),
    Cancelled,
}

impl FailureReason {
    /// Reason recorded for a remote failure.
    ///
    /// `fallback` classifies errors that do not name their own stage.
    pub fn from_error(err: &AccessError, fallback: fn(String) -> FailureReason) -> Self {
        match err {
            AccessError::Protection(message) => FailureReason::Protection(message.clone()),
            AccessError::Grant(message) => FailureReason::Grant(message.clone()),
            AccessError::Revocation(message) => FailureReason::Revocation(message.clone()),
            AccessError::Consumption(message) => FailureReason::Consumption(message.clone()),
            AccessError::Permission(message) => FailureReason::Permission(message.clone()),
            AccessError::Cancelled => FailureReason::Cancelled,
            other => fallback(other.to_string()),
        }
    }
}

/// One state per lifecycle key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LifecycleState {
    Unprotected,
    Protecting,
    Protected,
    Registering,
    Granting,
    Granted,
    Consuming,
    Revoking,
    Failed(FailureReason),
}

impl LifecycleState {
    /// True while an external call is running for the key.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            LifecycleState::Protecting
                | LifecycleState::Registering
                | LifecycleState::Granting
                | LifecycleState::Consuming
                | LifecycleState::Revoking
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LifecycleState::Failed(_))
    }
}

/// A key and its current state, as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEntry {
    #[schema(value_type = String)]
    pub key: LifecycleKey,
    pub state: LifecycleState,
    pub updated_at: DateTime<Utc>,
}
