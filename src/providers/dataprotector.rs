// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP gateway to the iExec data protector and web3mail.
//!
//! The gateway exposes the SDK operation set as JSON endpoints:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | protect | `POST protected-data` |
//! | list owned | `GET protected-data?owner=` |
//! | grant | `POST grants` |
//! | list grants | `GET grants?protectedData=&authorizedUser=&authorizedApp=` |
//! | revoke | `POST grants/revoke` |
//! | contacts | `GET contacts?user=&strict=` |
//! | send email | `POST protected-data/{address}/consume` |
//!
//! A `403` means the caller holds no usable grant.

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::protector::{
    AccessGrant, AccessibleRecord, ConsumeAck, ConsumeParams, DataProtector, DataProtectorError,
    GrantAccessParams, GrantFilter, GrantedAccessList, ProtectParams, ProtectedDataRecord,
    RevokeReceipt,
};
use crate::providers::registry::parse_base_url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxResponse {
    tx_hash: String,
}

#[derive(Debug, Serialize)]
struct OwnerQuery {
    owner: String,
}

#[derive(Debug, Serialize)]
struct ContactsQuery {
    user: String,
    strict: bool,
}

/// Gateway client.
#[derive(Debug, Clone)]
pub struct HttpDataProtector {
    base_url: Url,
    http: Client,
}

impl HttpDataProtector {
    /// No request timeout: protect and grant wait on wallet signatures.
    pub fn new(base_url: &str) -> Result<Self, DataProtectorError> {
        let base_url =
            parse_base_url(base_url).map_err(|e| DataProtectorError::Request(e.to_string()))?;
        let http = Client::builder()
            .build()
            .map_err(|e| DataProtectorError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    fn endpoint(&self, path: &str) -> Result<Url, DataProtectorError> {
        self.base_url
            .join(path)
            .map_err(|e| DataProtectorError::Request(e.to_string()))
    }

    async fn get_json<T, Q>(&self, path: &str, query: &Q) -> Result<T, DataProtectorError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self
            .http
            .get(self.endpoint(path)?)
            .query(query)
            .send()
            .await
            .map_err(|e| DataProtectorError::Request(e.to_string()))?;
        read_json(response).await
    }

    async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, DataProtectorError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await
            .map_err(|e| DataProtectorError::Request(e.to_string()))?;
        read_json(response).await
    }
}

#[async_trait]
impl DataProtector for HttpDataProtector {
    async fn protect(&self, params: &ProtectParams) -> Result<ProtectedDataRecord, DataProtectorError> {
        self.post_json("protected-data", params).await
    }

    async fn list_owned(&self, owner: &Address) -> Result<Vec<ProtectedDataRecord>, DataProtectorError> {
        let query = OwnerQuery {
            owner: owner.to_string(),
        };
        self.get_json("protected-data", &query).await
    }

    async fn grant_access(&self, params: &GrantAccessParams) -> Result<AccessGrant, DataProtectorError> {
        self.post_json("grants", params).await
    }

    async fn list_granted_access(&self, filter: &GrantFilter) -> Result<GrantedAccessList, DataProtectorError> {
        self.get_json("grants", filter).await
    }

    async fn revoke_access(&self, grant: &AccessGrant) -> Result<RevokeReceipt, DataProtectorError> {
        let response: TxResponse = self.post_json("grants/revoke", grant).await?;
        Ok(RevokeReceipt {
            grant_id: grant.grant_id.clone(),
            tx_hash: response.tx_hash,
        })
    }

    async fn fetch_accessible_records(
        &self,
        user: &Address,
        strict: bool,
    ) -> Result<Vec<AccessibleRecord>, DataProtectorError> {
        let query = ContactsQuery {
            user: user.to_string(),
            strict,
        };
        self.get_json("contacts", &query).await
    }

    async fn consume(&self, params: &ConsumeParams) -> Result<ConsumeAck, DataProtectorError> {
        let path = format!("protected-data/{}/consume", params.protected_data);
        self.post_json(&path, params).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, DataProtectorError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_failure(status, &body));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| DataProtectorError::InvalidResponse(e.to_string()))
}

/// Map a failed gateway response, keeping its message verbatim.
fn classify_failure(status: StatusCode, body: &str) -> DataProtectorError {
    let message = error_message(status, body);
    match status {
        StatusCode::FORBIDDEN => DataProtectorError::AccessDenied(message),
        StatusCode::NOT_FOUND => DataProtectorError::NotFound(message),
        _ => DataProtectorError::Rejected(message),
    }
}

/// Pull `error` or `message` out of a JSON body, else use the raw text.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let from_json = parsed.as_ref().and_then(|value| {
        value
            .get("error")
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => format!("gateway returned {status}"),
        None => body.trim().to_string(),
    }
}
