// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use alloy::primitives::Address;
use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    blockchain::{NetworkState, NetworkStatus, WalletEvent},
    directory::DirectoryListing,
    error::ApiError,
    lifecycle::{
        ConsumeOutcome, DedupeFailure, DedupeReport, FailureReason, GrantOutcome, LifecycleEntry,
        LifecycleState, ProtectOutcome,
    },
    models::{AccountResponse, GrantRequest, ProtectRequest, RevokeRequest, SendEmailRequest},
    protector::{
        AccessGrant, AccessibleRecord, DataSchema, GrantId, GrantedAccessList,
        ProtectedDataRecord, RevokeReceipt,
    },
    state::AppState,
};

pub mod contacts;
pub mod grants;
pub mod health;
pub mod lifecycle;
pub mod network;
pub mod protected_data;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Parse a protected data address from a path segment.
pub(crate) fn parse_record_id(raw: &str) -> Result<Address, ApiError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| ApiError::bad_request(format!("Invalid protected data address `{raw}`: {e}")))
}

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/network", get(network::get_network))
        .route("/network/ensure", post(network::ensure_network))
        .route("/network/events", post(network::wallet_event))
        .route("/account", get(network::get_account))
        .route(
            "/protected-data",
            get(protected_data::list_protected_data).post(protected_data::protect_data),
        )
        .route(
            "/protected-data/{id}/registration",
            post(protected_data::retry_registration),
        )
        .route("/protected-data/{id}/emails", post(protected_data::send_email))
        .route(
            "/protected-data/{id}/grants",
            get(grants::list_grants).post(grants::grant_access),
        )
        .route("/protected-data/{id}/grants/revoke", post(grants::revoke_access))
        .route(
            "/protected-data/{id}/grants/deduplicate",
            post(grants::deduplicate_grants),
        )
        .route("/contacts", get(contacts::list_contacts))
        .route("/lifecycle", get(lifecycle::list_lifecycles))
        .route("/lifecycle/{key}", get(lifecycle::get_lifecycle))
        .route("/lifecycle/{key}/cancel", post(lifecycle::cancel_operation));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        network::get_network,
        network::ensure_network,
        network::wallet_event,
        network::get_account,
        protected_data::list_protected_data,
        protected_data::protect_data,
        protected_data::retry_registration,
        protected_data::send_email,
        grants::list_grants,
        grants::grant_access,
        grants::revoke_access,
        grants::deduplicate_grants,
        contacts::list_contacts,
        lifecycle::list_lifecycles,
        lifecycle::get_lifecycle,
        lifecycle::cancel_operation
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            NetworkState,
            NetworkStatus,
            WalletEvent,
            AccountResponse,
            ProtectRequest,
            ProtectOutcome,
            ProtectedDataRecord,
            DataSchema,
            GrantRequest,
            GrantOutcome,
            AccessGrant,
            GrantId,
            GrantedAccessList,
            RevokeRequest,
            RevokeReceipt,
            DedupeReport,
            DedupeFailure,
            SendEmailRequest,
            ConsumeOutcome,
            AccessibleRecord,
            DirectoryListing,
            LifecycleEntry,
            LifecycleState,
            FailureReason
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Network", description = "Wallet account and network synchronization"),
        (name = "Protected Data", description = "Email protection and consumption"),
        (name = "Grants", description = "Access grants on protected data"),
        (name = "Contacts", description = "Records the user may email"),
        (name = "Lifecycle", description = "Per-record operation state")
    )
)]
struct ApiDoc;

/// State wired around in-memory collaborators.
#[cfg(test)]
pub(crate) fn test_state(
    wallet: crate::test_support::MockWallet,
) -> (
    AppState,
    std::sync::Arc<crate::test_support::MockProtector>,
    std::sync::Arc<crate::test_support::MockRegistry>,
) {
    use std::sync::Arc;

    use crate::blockchain::IEXEC_SIDECHAIN;
    use crate::lifecycle::SessionSettings;
    use crate::test_support::{mail_app, MockProtector, MockRegistry};

    let protector = Arc::new(MockProtector::new());
    let registry = Arc::new(MockRegistry::new());
    let state = AppState::new(
        Arc::new(wallet),
        protector.clone(),
        registry.clone(),
        IEXEC_SIDECHAIN,
        SessionSettings {
            authorized_app: mail_app(),
            sender_name: "Relational".to_string(),
        },
    );
    (state, protector, registry)
}
