// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use alloy::primitives::Address;
use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    directory::DirectoryListing,
    error::{AccessError, ApiError},
    models::ContactsQuery,
    state::AppState,
};

/// Protected records the user may send email to.
///
/// When the gateway is unreachable the previous listing is returned with
/// `stale: true`.
#[utoipa::path(
    get,
    path = "/v1/contacts",
    params(ContactsQuery),
    tag = "Contacts",
    responses(
        (status = 200, body = DirectoryListing),
        (status = 503, description = "Gateway unreachable and nothing cached")
    )
)]
pub async fn list_contacts(
    State(state): State<AppState>,
    Query(query): Query<ContactsQuery>,
) -> Result<Json<DirectoryListing>, ApiError> {
    let user = match query.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(raw) => raw
            .parse::<Address>()
            .map_err(|e| ApiError::bad_request(format!("user: invalid address `{raw}`: {e}")))?,
        None => state
            .wallet()
            .account()
            .await
            .map_err(|e| AccessError::ProviderUnavailable(e.message))?
            .ok_or_else(|| AccessError::ProviderUnavailable("no wallet account connected".to_string()))?,
    };

    Ok(Json(state.directory.refresh(&user).await?))
}
