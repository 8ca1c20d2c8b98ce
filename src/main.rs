// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::sync::Arc;

use relational_dataguard::{
    api::router,
    blockchain::RpcWallet,
    config::{AppConfig, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV},
    lifecycle::SessionSettings,
    providers::{HttpDataProtector, HttpRegistry},
    state::AppState,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env()?;
    info!(
        network = %config.network.name,
        chain_id = config.network.chain_id,
        mail_app = %config.mail_app,
        "Starting Relational DataGuard"
    );

    let wallet = Arc::new(RpcWallet::new(&config.wallet_rpc_url)?);
    let protector = Arc::new(HttpDataProtector::new(&config.dataprotector_api_url)?);
    let registry = Arc::new(HttpRegistry::new(&config.registry_url)?);

    let state = AppState::new(
        wallet,
        protector,
        registry,
        config.network.clone(),
        SessionSettings {
            authorized_app: config.mail_app.clone(),
            sender_name: config.mail_sender_name.clone(),
        },
    );

    let shutdown = CancellationToken::new();
    let watcher = tokio::spawn(state.guard.clone().watch(shutdown.clone()));

    let addr: SocketAddr = config.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Relational DataGuard listening (docs at /docs)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(err) = watcher.await {
        error!(error = %err, "Chain watcher task failed");
    }
    info!("Server stopped");
    Ok(())
}
