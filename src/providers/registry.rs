// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Backend user registry.
//!
//! Maps wallet addresses to the email they protected so the rest of the
//! platform knows an account exists. Eventually consistent; `addEmail` is an
//! upsert and can be retried freely.

use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry configuration invalid: {0}")]
    InvalidConfig(String),

    #[error("Registry request failed: {0}")]
    Request(String),

    #[error("Registry rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Registry response was invalid: {0}")]
    InvalidResponse(String),
}

/// Account registry kept by the backend.
#[async_trait]
pub trait UserRegistry: Send + Sync {
    /// Whether an account exists for `address`.
    async fn exists_by_address(&self, address: &Address) -> Result<bool, RegistryError>;

    /// Record the email protected by `address`.
    async fn register_email(&self, address: &Address, email: &str) -> Result<(), RegistryError>;
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Debug, Serialize)]
struct AddEmailBody<'a> {
    address: String,
    email: &'a str,
}

/// HTTP client for the registry.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base_url: Url,
    http: Client,
}

impl HttpRegistry {
    pub fn new(base_url: &str) -> Result<Self, RegistryError> {
        let base_url = parse_base_url(base_url)?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RegistryError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RegistryError> {
        self.base_url
            .join(path)
            .map_err(|e| RegistryError::InvalidConfig(e.to_string()))
    }
}

#[async_trait]
impl UserRegistry for HttpRegistry {
    async fn exists_by_address(&self, address: &Address) -> Result<bool, RegistryError> {
        let url = self.endpoint(&format!("user/getUser/{address}"))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RegistryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: ExistsResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;
        Ok(body.exists)
    }

    async fn register_email(&self, address: &Address, email: &str) -> Result<(), RegistryError> {
        let url = self.endpoint("user/addEmail")?;
        let response = self
            .http
            .post(url)
            .json(&AddEmailBody {
                address: address.to_string(),
                email,
            })
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(RegistryError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Parse a base URL so relative joins keep its path.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, RegistryError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| RegistryError::InvalidConfig(format!("{raw}: {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
