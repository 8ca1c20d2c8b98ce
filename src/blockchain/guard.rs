// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Chain Synchronization Guard
//!
//! Keeps the connected wallet on the one network the protected data lives
//! on. Every privileged operation calls [`ChainGuard::ensure_network`]
//! first; the guard re-reads the wallet's chain each time because the user
//! can switch networks from the wallet UI whenever they like.
//!
//! ## Switching
//!
//! 1. Wallet already on the required chain: `Synced`, no request issued.
//! 2. Otherwise `wallet_switchEthereumChain`. This waits for the user with
//!    no timeout; dismissing the prompt comes back as a rejection.
//! 3. Error `4902` (unknown chain): `wallet_addEthereumChain` with the full
//!    descriptor, then one more switch. Nothing is retried beyond that.
//! 4. Any other failure: `SwitchFailed`, error returned as the wallet gave it.
//!
//! Only one switch-or-add cycle is outstanding at a time. Callers arriving
//! while it runs wait for it, then read the chain again before deciding to
//! prompt the wallet themselves.
//!
//! The cached [`NetworkState`] is only for display. A background watcher
//! ([`ChainGuard::watch`]) updates it from wallet notifications and resets it
//! when the wallet disconnects.

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::types::{AddChainParams, NetworkConfig, NetworkState, NetworkStatus};
use super::wallet::{WalletError, WalletEvent, WalletProvider};
use crate::error::AccessError;

pub struct ChainGuard {
    wallet: Arc<dyn WalletProvider>,
    network: NetworkConfig,
    state: RwLock<NetworkState>,
    /// Held across one switch-or-add cycle
    switching: AsyncMutex<()>,
}

impl ChainGuard {
    pub fn new(wallet: Arc<dyn WalletProvider>, network: NetworkConfig) -> Self {
        let state = NetworkState::unknown(network.chain_id);
        Self {
            wallet,
            network,
            state: RwLock::new(state),
            switching: AsyncMutex::new(()),
        }
    }

    /// The network every privileged call must run on.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn wallet(&self) -> &Arc<dyn WalletProvider> {
        &self.wallet
    }

    /// Last known state, without querying the wallet.
    pub fn snapshot(&self) -> NetworkState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_state(&self, next: NetworkState) {
        match self.state.write() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn set_status(&self, status: NetworkStatus) {
        let mut next = self.snapshot();
        next.status = status;
        self.set_state(next);
    }

    /// Bring the wallet onto the required network.
    ///
    /// Returns the `Synced` state, or the error that stopped the switch.
    pub async fn ensure_network(&self) -> Result<NetworkState, AccessError> {
        let required = self.network.chain_id;
        if self.read_chain_id().await? == required {
            return Ok(self.snapshot());
        }

        let _switching = self.switching.lock().await;
        let current = self.read_chain_id().await?;
        if current == required {
            return Ok(self.snapshot());
        }

        info!(
            current_chain_id = current,
            required_chain_id = required,
            "Wallet on wrong network, requesting switch"
        );
        self.set_status(NetworkStatus::Switching);

        match self.wallet.switch_chain(required).await {
            Ok(()) => self.confirm_switch().await,
            Err(err) if err.is_unrecognized_chain() => {
                info!(
                    chain_id = required,
                    network = %self.network.name,
                    "Wallet does not know the network, requesting add"
                );
                let params = AddChainParams::from(&self.network);
                if let Err(err) = self.wallet.add_chain(&params).await {
                    return Err(self.switch_failed(err));
                }
                match self.wallet.switch_chain(required).await {
                    Ok(()) => self.confirm_switch().await,
                    Err(err) => Err(self.switch_failed(err)),
                }
            }
            Err(err) => Err(self.switch_failed(err)),
        }
    }

    /// Read the wallet's chain and record it.
    async fn read_chain_id(&self) -> Result<u64, AccessError> {
        let chain_id = match self.wallet.chain_id().await {
            Ok(Some(chain_id)) => chain_id,
            Ok(None) => {
                self.set_state(NetworkState::unknown(self.network.chain_id));
                return Err(AccessError::ProviderUnavailable(
                    "wallet did not report a chain id".to_string(),
                ));
            }
            Err(err) => {
                self.set_state(NetworkState::unknown(self.network.chain_id));
                return Err(AccessError::ProviderUnavailable(err.message));
            }
        };

        let mut observed = NetworkState::observed(self.network.chain_id, chain_id);
        if observed.status == NetworkStatus::Mismatched && self.switching.try_lock().is_err() {
            observed.status = NetworkStatus::Switching;
        }
        self.set_state(observed);
        Ok(chain_id)
    }

    /// The wallet accepted the switch; check it actually moved.
    async fn confirm_switch(&self) -> Result<NetworkState, AccessError> {
        let required = self.network.chain_id;
        let current = self.read_chain_id().await?;
        if current == required {
            info!(chain_id = required, "Wallet switched to required network");
            Ok(self.snapshot())
        } else {
            Err(self.switch_failed(WalletError::transport(format!(
                "wallet accepted the switch but is still on chain {current}"
            ))))
        }
    }

    fn switch_failed(&self, err: WalletError) -> AccessError {
        warn!(
            code = ?err.code,
            error = %err.message,
            required_chain_id = self.network.chain_id,
            "Network switch failed"
        );
        self.set_status(NetworkStatus::SwitchFailed);
        AccessError::Network(err)
    }

    /// Apply a wallet notification to the cached state.
    pub fn apply_event(&self, event: WalletEvent) {
        match event {
            WalletEvent::ChainChanged { chain_id } => {
                info!(chain_id, "Wallet chain changed");
                self.set_state(NetworkState::observed(self.network.chain_id, chain_id));
            }
            WalletEvent::Disconnected => {
                info!("Wallet disconnected, dropping network state");
                self.set_state(NetworkState::unknown(self.network.chain_id));
            }
        }
    }

    /// Follow wallet notifications until `shutdown` is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(guard.clone().watch(shutdown.clone()));
    /// ```
    pub async fn watch(self: Arc<Self>, shutdown: CancellationToken) {
        let mut events = self.wallet.subscribe();
        info!(network = %self.network.name, "Chain watcher starting");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Chain watcher shutting down");
                    return;
                }
                event = events.recv() => match event {
                    Ok(event) => self.apply_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Chain watcher lagged, invalidating network state");
                        self.set_state(NetworkState::unknown(self.network.chain_id));
                    }
                    Err(RecvError::Closed) => {
                        self.apply_event(WalletEvent::Disconnected);
                        return;
                    }
                },
            }
        }
    }
}
