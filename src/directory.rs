// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Records the connected user may send email to.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::error::AccessError;
use crate::protector::AccessibleRecord;
use crate::store::ProtectedDataStore;

/// A contact listing as shown to the user.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub records: Vec<AccessibleRecord>,
    pub fetched_at: DateTime<Utc>,
    /// The refresh failed and `records` is the previous listing
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ContactDirectory {
    store: ProtectedDataStore,
    last: Mutex<HashMap<Address, DirectoryListing>>,
}

impl ContactDirectory {
    pub fn new(store: ProtectedDataStore) -> Self {
        Self {
            store,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Records `user` holds a grant with uses left on. Always re-fetched.
    ///
    /// Any failure to read, network check included, is `DirectoryUnavailable`.
    pub async fn list_accessible_records(&self, user: &Address) -> Result<Vec<AccessibleRecord>, AccessError> {
        let mut records = self
            .store
            .fetch_accessible_records(user)
            .await
            .map_err(as_directory_error)?;
        records.retain(|record| record.remaining_uses > 0);
        Ok(records)
    }

    /// Like [`ContactDirectory::list_accessible_records`], falling back to
    /// the previous listing of the same user when the fetch fails.
    pub async fn refresh(&self, user: &Address) -> Result<DirectoryListing, AccessError> {
        match self.list_accessible_records(user).await {
            Ok(records) => {
                let listing = DirectoryListing {
                    records,
                    fetched_at: Utc::now(),
                    stale: false,
                    error: None,
                };
                self.last
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(*user, listing.clone());
                Ok(listing)
            }
            Err(err) => {
                let previous = self
                    .last
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(user)
                    .cloned();
                match previous {
                    Some(previous) => {
                        warn!(user = %user, error = %err, "Contact refresh failed, serving previous listing");
                        Ok(DirectoryListing {
                            stale: true,
                            error: Some(err.to_string()),
                            ..previous
                        })
                    }
                    None => Err(err),
                }
            }
        }
    }
}

fn as_directory_error(err: AccessError) -> AccessError {
    match err {
        AccessError::Validation(_) | AccessError::DirectoryUnavailable(_) => err,
        other => AccessError::DirectoryUnavailable(other.to_string()),
    }
}
