// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Confidential-computing access-control service.
//!
//! Encryption, attestation and mail delivery all happen inside the service;
//! this crate only drives its operation set. None of the operations are
//! idempotent: a repeated `grant_access` creates a second grant.

use alloy::primitives::Address;
use async_trait::async_trait;

pub mod types;

pub use types::*;

/// Errors returned by the access-control service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataProtectorError {
    /// The service refused the operation (reverted tx, bad input...)
    #[error("{0}")]
    Rejected(String),

    /// The caller holds no usable grant
    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Operation set of the access-control service.
#[async_trait]
pub trait DataProtector: Send + Sync {
    /// Encrypt and register a new record. Returns the record with its address.
    async fn protect(&self, params: &ProtectParams) -> Result<ProtectedDataRecord, DataProtectorError>;

    /// Records owned by `owner`.
    async fn list_owned(&self, owner: &Address) -> Result<Vec<ProtectedDataRecord>, DataProtectorError>;

    /// Create a grant. Additive: never updates an existing one.
    async fn grant_access(&self, params: &GrantAccessParams) -> Result<AccessGrant, DataProtectorError>;

    async fn list_granted_access(&self, filter: &GrantFilter) -> Result<GrantedAccessList, DataProtectorError>;

    async fn revoke_access(&self, grant: &AccessGrant) -> Result<RevokeReceipt, DataProtectorError>;

    /// Records `user` has been granted access to. With `strict`, grants
    /// open to any user are left out.
    async fn fetch_accessible_records(
        &self,
        user: &Address,
        strict: bool,
    ) -> Result<Vec<AccessibleRecord>, DataProtectorError>;

    /// Use one access of a grant to send an email to the protected address.
    async fn consume(&self, params: &ConsumeParams) -> Result<ConsumeAck, DataProtectorError>;
}
