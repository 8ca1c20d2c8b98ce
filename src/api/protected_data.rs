// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::parse_record_id,
    error::ApiError,
    lifecycle::{ConsumeOutcome, ProtectOutcome},
    models::{ProtectRequest, SendEmailRequest},
    protector::ProtectedDataRecord,
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/v1/protected-data",
    tag = "Protected Data",
    responses((status = 200, body = [ProtectedDataRecord]))
)]
pub async fn list_protected_data(State(state): State<AppState>) -> Result<Json<Vec<ProtectedDataRecord>>, ApiError> {
    Ok(Json(state.controller.list_owned().await?))
}

/// Protect an email address and register it with the backend.
///
/// A failed registration does not fail the request; see `registered`.
#[utoipa::path(
    post,
    path = "/v1/protected-data",
    request_body = ProtectRequest,
    tag = "Protected Data",
    responses(
        (status = 201, body = ProtectOutcome),
        (status = 400, description = "Invalid email address"),
        (status = 409, description = "The wallet refused to switch network")
    )
)]
pub async fn protect_data(
    State(state): State<AppState>,
    Json(request): Json<ProtectRequest>,
) -> Result<(StatusCode, Json<ProtectOutcome>), ApiError> {
    let outcome = state
        .controller
        .protect(&request.email, request.name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[utoipa::path(
    post,
    path = "/v1/protected-data/{id}/registration",
    params(
        ("id" = String, Path, description = "Protected data address")
    ),
    tag = "Protected Data",
    responses(
        (status = 204),
        (status = 404, description = "No pending registration"),
        (status = 502, description = "Registry still failing")
    )
)]
pub async fn retry_registration(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let id = parse_record_id(&id)?;
    state.controller.retry_registration(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Send an email to the owner of a protected address.
#[utoipa::path(
    post,
    path = "/v1/protected-data/{id}/emails",
    params(
        ("id" = String, Path, description = "Protected data address")
    ),
    request_body = SendEmailRequest,
    tag = "Protected Data",
    responses(
        (status = 200, body = ConsumeOutcome),
        (status = 403, description = "No usable grant for the connected account")
    )
)]
pub async fn send_email(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SendEmailRequest>,
) -> Result<Json<ConsumeOutcome>, ApiError> {
    let id = parse_record_id(&id)?;
    let outcome = state
        .controller
        .consume(id, &request.subject, &request.content)
        .await?;
    Ok(Json(outcome))
}
