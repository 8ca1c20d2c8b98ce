// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::ApiError,
    lifecycle::{LifecycleEntry, LifecycleKey},
    state::AppState,
};

fn parse_key(raw: &str) -> Result<LifecycleKey, ApiError> {
    raw.parse::<LifecycleKey>().map_err(ApiError::bad_request)
}

#[utoipa::path(
    get,
    path = "/v1/lifecycle",
    tag = "Lifecycle",
    responses((status = 200, body = [LifecycleEntry]))
)]
pub async fn list_lifecycles(State(state): State<AppState>) -> Json<Vec<LifecycleEntry>> {
    Json(state.controller.snapshot())
}

#[utoipa::path(
    get,
    path = "/v1/lifecycle/{key}",
    params(
        ("key" = String, Path, description = "Protected data address or `draft:<uuid>`")
    ),
    tag = "Lifecycle",
    responses(
        (status = 200, body = LifecycleEntry),
        (status = 404, description = "Key never seen")
    )
)]
pub async fn get_lifecycle(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LifecycleEntry>, ApiError> {
    let key = parse_key(&key)?;
    state
        .controller
        .entry(&key)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No lifecycle for {key}")))
}

/// Abort the external call in flight for a key.
#[utoipa::path(
    post,
    path = "/v1/lifecycle/{key}/cancel",
    params(
        ("key" = String, Path, description = "Protected data address or `draft:<uuid>`")
    ),
    tag = "Lifecycle",
    responses(
        (status = 202),
        (status = 404, description = "Nothing in flight")
    )
)]
pub async fn cancel_operation(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let key = parse_key(&key)?;
    state.controller.cancel(&key)?;
    Ok(StatusCode::ACCEPTED)
}
