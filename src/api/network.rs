// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use tracing::warn;

use crate::{
    blockchain::{NetworkState, WalletEvent},
    error::{AccessError, ApiError},
    models::AccountResponse,
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/v1/network",
    tag = "Network",
    responses((status = 200, body = NetworkState))
)]
pub async fn get_network(State(state): State<AppState>) -> Json<NetworkState> {
    Json(state.guard.snapshot())
}

/// Bring the wallet onto the required network, prompting the user if needed.
#[utoipa::path(
    post,
    path = "/v1/network/ensure",
    tag = "Network",
    responses(
        (status = 200, body = NetworkState),
        (status = 409, description = "The wallet refused to switch"),
        (status = 503, description = "No wallet connected")
    )
)]
pub async fn ensure_network(State(state): State<AppState>) -> Result<Json<NetworkState>, ApiError> {
    Ok(Json(state.guard.ensure_network().await?))
}

/// Chain-change and disconnect notifications relayed by the wallet bridge.
#[utoipa::path(
    post,
    path = "/v1/network/events",
    request_body = WalletEvent,
    tag = "Network",
    responses((status = 202))
)]
pub async fn wallet_event(State(state): State<AppState>, Json(event): Json<WalletEvent>) -> StatusCode {
    state.wallet().publish(event);
    StatusCode::ACCEPTED
}

#[utoipa::path(
    get,
    path = "/v1/account",
    tag = "Network",
    responses(
        (status = 200, body = AccountResponse),
        (status = 503, description = "Wallet bridge unreachable")
    )
)]
pub async fn get_account(State(state): State<AppState>) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .wallet()
        .account()
        .await
        .map_err(|e| AccessError::ProviderUnavailable(e.message))?;

    let registered = match &account {
        Some(address) => match state.registry.exists_by_address(address).await {
            Ok(exists) => Some(exists),
            Err(err) => {
                warn!(account = %address, error = %err, "Registry lookup failed");
                None
            }
        },
        None => None,
    };

    Ok(Json(AccountResponse {
        account,
        network: state.guard.snapshot(),
        registered,
    }))
}
