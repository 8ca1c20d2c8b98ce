// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::blockchain::{ChainGuard, NetworkConfig, WalletProvider};
use crate::directory::ContactDirectory;
use crate::lifecycle::{AccessLifecycleController, SessionSettings};
use crate::protector::DataProtector;
use crate::providers::UserRegistry;
use crate::store::ProtectedDataStore;

#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<ChainGuard>,
    pub controller: Arc<AccessLifecycleController>,
    pub directory: Arc<ContactDirectory>,
    pub registry: Arc<dyn UserRegistry>,
}

impl AppState {
    /// Wire the core around its external collaborators.
    pub fn new(
        wallet: Arc<dyn WalletProvider>,
        protector: Arc<dyn DataProtector>,
        registry: Arc<dyn UserRegistry>,
        network: NetworkConfig,
        settings: SessionSettings,
    ) -> Self {
        let guard = Arc::new(ChainGuard::new(wallet, network));
        let store = ProtectedDataStore::new(guard.clone(), protector);
        let controller = Arc::new(AccessLifecycleController::new(store.clone(), registry.clone(), settings));
        let directory = Arc::new(ContactDirectory::new(store));

        Self {
            guard,
            controller,
            directory,
            registry,
        }
    }

    pub fn wallet(&self) -> &Arc<dyn WalletProvider> {
        self.guard.wallet()
    }
}
