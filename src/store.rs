// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Network-checked access to the data protector.
//!
//! [`ProtectedDataStore`] is the only path from the core to the gateway.
//! Each call first makes sure the wallet sits on the required chain, then
//! normalizes gateway failures into [`AccessError`] with the message kept
//! verbatim.

use std::sync::Arc;

use alloy::primitives::Address;
use tracing::debug;

use crate::blockchain::ChainGuard;
use crate::error::AccessError;
use crate::protector::{
    AccessGrant, AccessibleRecord, ConsumeAck, ConsumeParams, DataProtector, DataProtectorError,
    GrantAccessParams, GrantFilter, GrantedAccessList, ProtectParams, ProtectedDataRecord,
    RevokeReceipt,
};

#[derive(Clone)]
pub struct ProtectedDataStore {
    guard: Arc<ChainGuard>,
    protector: Arc<dyn DataProtector>,
}

impl ProtectedDataStore {
    pub fn new(guard: Arc<ChainGuard>, protector: Arc<dyn DataProtector>) -> Self {
        Self { guard, protector }
    }

    pub fn guard(&self) -> &Arc<ChainGuard> {
        &self.guard
    }

    pub async fn protect(&self, params: &ProtectParams) -> Result<ProtectedDataRecord, AccessError> {
        self.guard.ensure_network().await?;
        debug!(owner = %params.owner, name = %params.name, "Protecting data");
        self.protector
            .protect(params)
            .await
            .map_err(|e| map_error(e, AccessError::Protection))
    }

    pub async fn list_owned(&self, owner: &Address) -> Result<Vec<ProtectedDataRecord>, AccessError> {
        self.guard.ensure_network().await?;
        self.protector
            .list_owned(owner)
            .await
            .map_err(|e| map_error(e, AccessError::DirectoryUnavailable))
    }

    pub async fn grant_access(&self, params: &GrantAccessParams) -> Result<AccessGrant, AccessError> {
        self.guard.ensure_network().await?;
        debug!(
            protected_data = %params.protected_data,
            authorized_user = %params.authorized_user,
            authorized_app = %params.authorized_app,
            number_of_access = params.number_of_access,
            "Granting access"
        );
        self.protector
            .grant_access(params)
            .await
            .map_err(|e| map_error(e, AccessError::Grant))
    }

    pub async fn list_granted_access(&self, filter: &GrantFilter) -> Result<GrantedAccessList, AccessError> {
        self.guard.ensure_network().await?;
        self.protector
            .list_granted_access(filter)
            .await
            .map_err(|e| map_error(e, AccessError::Grant))
    }

    pub async fn revoke_access(&self, grant: &AccessGrant) -> Result<RevokeReceipt, AccessError> {
        self.guard.ensure_network().await?;
        debug!(grant_id = %grant.grant_id, "Revoking grant");
        self.protector
            .revoke_access(grant)
            .await
            .map_err(|e| map_error(e, AccessError::Revocation))
    }

    /// Records `user` may consume. Strict listing only.
    pub async fn fetch_accessible_records(&self, user: &Address) -> Result<Vec<AccessibleRecord>, AccessError> {
        self.guard.ensure_network().await?;
        self.protector
            .fetch_accessible_records(user, true)
            .await
            .map_err(|e| map_error(e, AccessError::DirectoryUnavailable))
    }

    pub async fn consume(&self, params: &ConsumeParams) -> Result<ConsumeAck, AccessError> {
        self.guard.ensure_network().await?;
        debug!(
            protected_data = %params.protected_data,
            consumer = %params.consumer,
            "Consuming access"
        );
        self.protector
            .consume(params)
            .await
            .map_err(|e| map_error(e, AccessError::Consumption))
    }
}

/// Denials become [`AccessError::Permission`], everything else `fallback`.
fn map_error(err: DataProtectorError, fallback: fn(String) -> AccessError) -> AccessError {
    match err {
        DataProtectorError::AccessDenied(message) => AccessError::Permission(message),
        other => fallback(other.to_string()),
    }
}
