// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet provider capability.
//!
//! The wallet is owned by the user, not by this service: its chain and
//! account can change at any time. Every consumer therefore goes through
//! [`WalletProvider`] and re-reads state instead of caching it.

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use utoipa::ToSchema;

use super::types::AddChainParams;

/// EIP-1193 code returned when the wallet does not know the requested chain.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// EIP-1193 code returned when the user dismisses or rejects a request.
pub const USER_REJECTED_CODE: i64 = 4001;

/// Default capacity of the wallet event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Error reported by the wallet, with the provider's code when it gave one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct WalletError {
    pub code: Option<i64>,
    pub message: String,
}

impl WalletError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Error without a provider code (transport failure, bad response).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Some(UNRECOGNIZED_CHAIN_CODE)
    }
}

/// Notification emitted by the wallet outside of our control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WalletEvent {
    /// The user switched networks
    #[serde(rename_all = "camelCase")]
    ChainChanged { chain_id: u64 },
    /// The wallet disconnected from the page
    Disconnected,
}

/// Fan-out channel for [`WalletEvent`]s.
#[derive(Debug, Clone)]
pub struct WalletEvents {
    tx: broadcast::Sender<WalletEvent>,
}

impl WalletEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn publish(&self, event: WalletEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for WalletEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// The user's wallet, as seen by the service.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Chain the wallet is connected to, `None` if it cannot tell.
    async fn chain_id(&self) -> Result<Option<u64>, WalletError>;

    /// Currently selected account, `None` if no account is connected.
    async fn account(&self) -> Result<Option<Address>, WalletError>;

    /// Ask the wallet to switch chains. Suspends until the user answers.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError>;

    /// Ask the wallet to add a chain it does not know yet.
    async fn add_chain(&self, params: &AddChainParams) -> Result<(), WalletError>;

    /// Subscribe to chain-change and disconnect notifications.
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;

    /// Inject a notification forwarded by the wallet bridge.
    fn publish(&self, event: WalletEvent);
}
