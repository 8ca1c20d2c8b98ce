// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC client for the user's wallet bridge.
//!
//! The browser forwards EIP-1193 requests it receives from this service to
//! the injected wallet and relays the answers, so the wallet looks like a
//! regular JSON-RPC endpoint here.

use alloy::{
    primitives::Address,
    providers::{Provider, RootProvider},
    transports::TransportError,
};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use super::types::AddChainParams;
use super::wallet::{WalletError, WalletEvent, WalletEvents, WalletProvider};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwitchChainParams {
    chain_id: String,
}

/// Wallet reached through a JSON-RPC bridge.
pub struct RpcWallet {
    /// Bridge endpoint, kept for logging
    rpc_url: String,
    /// Alloy HTTP provider
    provider: RootProvider,
    events: WalletEvents,
}

impl RpcWallet {
    /// Create a client for the bridge at `rpc_url`.
    pub fn new(rpc_url: &str) -> Result<Self, WalletError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| WalletError::transport(format!("Invalid wallet RPC URL: {e}")))?;

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            provider: RootProvider::new_http(url),
            events: WalletEvents::new(),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn chain_id(&self) -> Result<Option<u64>, WalletError> {
        let chain_id = self.provider.get_chain_id().await.map_err(map_rpc_error)?;
        Ok(Some(chain_id))
    }

    async fn account(&self) -> Result<Option<Address>, WalletError> {
        let accounts = self.provider.get_accounts().await.map_err(map_rpc_error)?;
        Ok(accounts.into_iter().next())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        let params = [SwitchChainParams {
            chain_id: format!("{chain_id:#x}"),
        }];
        self.provider
            .raw_request::<_, serde_json::Value>("wallet_switchEthereumChain".into(), params)
            .await
            .map_err(map_rpc_error)?;
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), WalletError> {
        self.provider
            .raw_request::<_, serde_json::Value>("wallet_addEthereumChain".into(), [params.clone()])
            .await
            .map_err(map_rpc_error)?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: WalletEvent) {
        self.events.publish(event);
    }
}

/// Keep the wallet's error code when the bridge relayed one.
fn map_rpc_error(err: TransportError) -> WalletError {
    match err.as_error_resp() {
        Some(payload) => WalletError::new(payload.code, payload.message.to_string()),
        None => WalletError::transport(err.to_string()),
    }
}
