// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::parse_record_id,
    error::ApiError,
    lifecycle::{DedupeReport, GrantOutcome},
    models::{parse_identity, require_identity, GrantQuery, GrantRequest, RevokeRequest},
    protector::{GrantedAccessList, RevokeReceipt},
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/v1/protected-data/{id}/grants",
    params(
        ("id" = String, Path, description = "Protected data address"),
        GrantQuery
    ),
    tag = "Grants",
    responses((status = 200, body = GrantedAccessList))
)]
pub async fn list_grants(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<GrantQuery>,
) -> Result<Json<GrantedAccessList>, ApiError> {
    let id = parse_record_id(&id)?;
    let user = parse_identity("authorizedUser", query.authorized_user.as_deref())?;
    let app = parse_identity("authorizedApp", query.authorized_app.as_deref())?;
    Ok(Json(state.controller.list_grants(id, user, app).await?))
}

/// Grant a user access. Returns the existing grant if one is still active.
#[utoipa::path(
    post,
    path = "/v1/protected-data/{id}/grants",
    params(
        ("id" = String, Path, description = "Protected data address")
    ),
    request_body = GrantRequest,
    tag = "Grants",
    responses(
        (status = 201, body = GrantOutcome),
        (status = 200, description = "An active grant already existed", body = GrantOutcome)
    )
)]
pub async fn grant_access(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<GrantRequest>,
) -> Result<(StatusCode, Json<GrantOutcome>), ApiError> {
    let id = parse_record_id(&id)?;
    let user = require_identity("authorizedUser", &request.authorized_user)?;
    let app = parse_identity("authorizedApp", request.authorized_app.as_deref())?;

    let outcome = state
        .controller
        .grant(id, user, app, request.number_of_access)
        .await?;
    let status = if outcome.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

#[utoipa::path(
    post,
    path = "/v1/protected-data/{id}/grants/revoke",
    params(
        ("id" = String, Path, description = "Protected data address")
    ),
    request_body = RevokeRequest,
    tag = "Grants",
    responses(
        (status = 200, body = RevokeReceipt),
        (status = 404, description = "No matching grant")
    )
)]
pub async fn revoke_access(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<RevokeReceipt>, ApiError> {
    let id = parse_record_id(&id)?;
    let user = require_identity("authorizedUser", &request.authorized_user)?;
    let app = parse_identity("authorizedApp", request.authorized_app.as_deref())?;

    let receipt = state
        .controller
        .revoke(id, user, app, request.grant_id)
        .await?;
    Ok(Json(receipt))
}

#[utoipa::path(
    post,
    path = "/v1/protected-data/{id}/grants/deduplicate",
    params(
        ("id" = String, Path, description = "Protected data address")
    ),
    tag = "Grants",
    responses((status = 200, body = DedupeReport, description = "`failed` is set when a revocation stopped the run"))
)]
pub async fn deduplicate_grants(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DedupeReport>, ApiError> {
    let id = parse_record_id(&id)?;
    Ok(Json(state.controller.deduplicate_grants(id).await?))
}
