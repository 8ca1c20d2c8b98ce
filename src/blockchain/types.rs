// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Network descriptors and chain synchronization state.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Native currency of a network, as announced to the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Full network descriptor.
///
/// Everything the wallet needs to add the network when it does not know it
/// yet (`wallet_addEthereumChain`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// Native currency
    pub currency: NativeCurrency,
    /// RPC endpoint URL
    pub rpc_url: &'static str,
    /// Block explorer URL
    pub explorer_url: &'static str,
}

impl NetworkConfig {
    /// Chain id as the `0x`-prefixed hex quantity wallets expect.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }
}

/// iExec Sidechain (Bellecour) configuration.
pub const IEXEC_SIDECHAIN: NetworkConfig = NetworkConfig {
    name: "iExec Sidechain",
    chain_id: 134,
    currency: NativeCurrency {
        name: "xRLC",
        symbol: "XRLC",
        decimals: 18,
    },
    rpc_url: "https://bellecour.iex.ec",
    explorer_url: "https://blockscout-bellecour.iex.ec",
};

/// Explorer page prefix for protected data (datasets) on Bellecour.
pub const IEXEC_DATASET_EXPLORER_URL: &str = "https://explorer.iex.ec/bellecour/dataset/";

/// Supported network identifier for this build.
pub const NETWORK_BELLECOUR: &str = "bellecour";

/// Resolve the configured network name to its descriptor.
///
/// Only Bellecour hosts the data protector contracts, so it is the only
/// accepted value.
pub fn resolve_network(raw: Option<&str>) -> Result<NetworkConfig, String> {
    let value = raw.unwrap_or(NETWORK_BELLECOUR).trim().to_ascii_lowercase();
    if value == NETWORK_BELLECOUR {
        Ok(IEXEC_SIDECHAIN)
    } else {
        Err(format!(
            "Only `{NETWORK_BELLECOUR}` network is supported in this deployment."
        ))
    }
}

/// Explorer link for a protected data address.
pub fn dataset_explorer_url(protected_data: &alloy::primitives::Address) -> String {
    format!("{IEXEC_DATASET_EXPLORER_URL}{protected_data}")
}

/// Parameters of `wallet_addEthereumChain` (EIP-3085).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrencyParams,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrencyParams {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl From<&NetworkConfig> for AddChainParams {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            chain_id: network.chain_id_hex(),
            chain_name: network.name.to_string(),
            native_currency: NativeCurrencyParams {
                name: network.currency.name.to_string(),
                symbol: network.currency.symbol.to_string(),
                decimals: network.currency.decimals,
            },
            rpc_urls: vec![network.rpc_url.to_string()],
            block_explorer_urls: vec![network.explorer_url.to_string()],
        }
    }
}

/// Synchronization status between the wallet and the required network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    /// Wallet is on the required chain
    Synced,
    /// Wallet is on another chain, or its chain is unknown
    Mismatched,
    /// A switch request is waiting on the wallet
    Switching,
    /// The last switch (or add) request was refused
    SwitchFailed,
}

/// Observed network state of the connected wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    /// Chain the wallet reported last (`None` when unknown)
    pub current_chain_id: Option<u64>,
    /// Chain every privileged call must run on
    pub required_chain_id: u64,
    pub status: NetworkStatus,
}

impl NetworkState {
    /// Initial state before the wallet has been queried.
    pub fn unknown(required_chain_id: u64) -> Self {
        Self {
            current_chain_id: None,
            required_chain_id,
            status: NetworkStatus::Mismatched,
        }
    }

    /// State derived from an observed chain id.
    pub fn observed(required_chain_id: u64, current: u64) -> Self {
        let status = if current == required_chain_id {
            NetworkStatus::Synced
        } else {
            NetworkStatus::Mismatched
        };
        Self {
            current_chain_id: Some(current),
            required_chain_id,
            status,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.status == NetworkStatus::Synced
    }
}
