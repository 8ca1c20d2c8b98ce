// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory wallet, gateway and registry used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Semaphore};

use crate::blockchain::{AddChainParams, WalletError, WalletEvent, WalletEvents, WalletProvider, UNRECOGNIZED_CHAIN_CODE};
use crate::protector::{
    AccessGrant, AccessibleRecord, AddressOrEnsName, ConsumeAck, ConsumeParams, DataProtector,
    DataProtectorError, DataSchema, GrantAccessParams, GrantFilter, GrantId, GrantedAccessList,
    ProtectParams, ProtectedDataRecord, RevokeReceipt,
};
use crate::providers::{RegistryError, UserRegistry};

pub const BELLECOUR: u64 = 134;
pub const MAIL_APP: &str = "web3mail.apps.iexec.eth";

pub fn owner() -> Address {
    Address::with_last_byte(0x0a)
}

pub fn consumer() -> Address {
    Address::with_last_byte(0xbb)
}

pub fn mail_app() -> AddressOrEnsName {
    AddressOrEnsName::Ens(MAIL_APP.to_string())
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Wallet
// =============================================================================

#[derive(Default)]
struct WalletInner {
    chain_id: Option<u64>,
    account: Option<Address>,
    known_chains: HashSet<u64>,
    switch_error: Option<WalletError>,
    add_error: Option<WalletError>,
    switch_calls: Vec<u64>,
    add_calls: Vec<AddChainParams>,
    switch_gate: Option<Arc<Semaphore>>,
}

pub struct MockWallet {
    inner: Mutex<WalletInner>,
    events: WalletEvents,
}

impl MockWallet {
    /// Wallet on `chain_id` that also knows Bellecour and mainnet.
    pub fn on_chain(chain_id: u64) -> Self {
        let inner = WalletInner {
            chain_id: Some(chain_id),
            account: Some(owner()),
            known_chains: [1, BELLECOUR, chain_id].into_iter().collect(),
            ..Default::default()
        };
        Self {
            inner: Mutex::new(inner),
            events: WalletEvents::new(),
        }
    }

    /// Wallet that cannot report a chain.
    pub fn disconnected() -> Self {
        let wallet = Self::on_chain(1);
        wallet.inner.lock().unwrap().chain_id = None;
        wallet
    }

    /// Forget every chain except the current one.
    pub fn without_bellecour(self) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let current = inner.chain_id;
            inner.known_chains = current.into_iter().collect();
        }
        self
    }

    pub fn reject_switch(self, err: WalletError) -> Self {
        self.inner.lock().unwrap().switch_error = Some(err);
        self
    }

    pub fn reject_add(self, err: WalletError) -> Self {
        self.inner.lock().unwrap().add_error = Some(err);
        self
    }

    pub fn with_account(self, account: Option<Address>) -> Self {
        self.inner.lock().unwrap().account = account;
        self
    }

    /// Leave switch prompts unanswered until [`MockWallet::release_switch`].
    pub fn hold_switch(&self) {
        self.inner.lock().unwrap().switch_gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Answer every held and future switch prompt.
    pub fn release_switch(&self) {
        if let Some(gate) = self.inner.lock().unwrap().switch_gate.take() {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    /// The user changes network from the wallet UI.
    pub fn user_switches_to(&self, chain_id: u64) {
        self.inner.lock().unwrap().chain_id = Some(chain_id);
        self.events.publish(WalletEvent::ChainChanged { chain_id });
    }

    pub fn switch_calls(&self) -> Vec<u64> {
        self.inner.lock().unwrap().switch_calls.clone()
    }

    pub fn add_calls(&self) -> Vec<AddChainParams> {
        self.inner.lock().unwrap().add_calls.clone()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn chain_id(&self) -> Result<Option<u64>, WalletError> {
        Ok(self.inner.lock().unwrap().chain_id)
    }

    async fn account(&self) -> Result<Option<Address>, WalletError> {
        Ok(self.inner.lock().unwrap().account)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        let gate = {
            let mut inner = self.inner.lock().unwrap();
            inner.switch_calls.push(chain_id);
            inner.switch_gate.clone()
        };
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| WalletError::transport(e.to_string()))?
                .forget();
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.switch_error.clone() {
            return Err(err);
        }
        if !inner.known_chains.contains(&chain_id) {
            return Err(WalletError::new(
                UNRECOGNIZED_CHAIN_CODE,
                format!("Unrecognized chain ID \"{chain_id:#x}\"."),
            ));
        }
        inner.chain_id = Some(chain_id);
        drop(inner);
        self.events.publish(WalletEvent::ChainChanged { chain_id });
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParams) -> Result<(), WalletError> {
        let mut inner = self.inner.lock().unwrap();
        inner.add_calls.push(params.clone());
        if let Some(err) = inner.add_error.clone() {
            return Err(err);
        }
        let chain_id = u64::from_str_radix(params.chain_id.trim_start_matches("0x"), 16)
            .map_err(|e| WalletError::transport(e.to_string()))?;
        inner.known_chains.insert(chain_id);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: WalletEvent) {
        self.events.publish(event);
    }
}

// =============================================================================
// Gateway
// =============================================================================

#[derive(Default)]
struct ProtectorInner {
    next_record: u8,
    next_grant: u64,
    records: Vec<ProtectedDataRecord>,
    grants: Vec<AccessGrant>,
    /// Calls still let through, then the error returned
    failures: HashMap<&'static str, (usize, DataProtectorError)>,
    gates: HashMap<&'static str, Arc<Semaphore>>,
    calls: Vec<&'static str>,
}

/// Gateway keeping records and grants in memory.
///
/// Exhausted grants stay listed with `remaining_uses == 0`.
#[derive(Default)]
pub struct MockProtector {
    inner: Mutex<ProtectorInner>,
}

impl MockProtector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail with `err` until cleared.
    pub fn fail(&self, op: &'static str, err: DataProtectorError) {
        self.fail_after(op, 0, err);
    }

    /// Let `calls` more calls of `op` through, then fail like [`MockProtector::fail`].
    pub fn fail_after(&self, op: &'static str, calls: usize, err: DataProtectorError) {
        self.inner.lock().unwrap().failures.insert(op, (calls, err));
    }

    pub fn clear_failure(&self, op: &'static str) {
        self.inner.lock().unwrap().failures.remove(op);
    }

    /// Block `op` until [`MockProtector::release`] lets it through.
    pub fn hold(&self, op: &'static str) {
        self.inner
            .lock()
            .unwrap()
            .gates
            .insert(op, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, op: &'static str, permits: usize) {
        if let Some(gate) = self.inner.lock().unwrap().gates.get(op) {
            gate.add_permits(permits);
        }
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| **call == op)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    pub fn grants(&self) -> Vec<AccessGrant> {
        self.inner.lock().unwrap().grants.clone()
    }

    /// Seed a record owned by `owner` without going through `protect`.
    pub fn seed_record(&self, owner: Address, name: &str) -> ProtectedDataRecord {
        let mut inner = self.inner.lock().unwrap();
        let record = new_record(&mut inner, owner, name);
        inner.records.push(record.clone());
        record
    }

    /// Seed a grant directly, bypassing any deduplication.
    pub fn seed_grant(
        &self,
        protected_data: Address,
        user: AddressOrEnsName,
        app: AddressOrEnsName,
        uses: u32,
    ) -> AccessGrant {
        let mut inner = self.inner.lock().unwrap();
        let grant = new_grant(&mut inner, protected_data, user, app, uses);
        inner.grants.push(grant.clone());
        grant
    }

    /// Record the call, then apply the configured failure or gate.
    async fn enter(&self, op: &'static str) -> Result<(), DataProtectorError> {
        let gate = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(op);
            if let Some((allowed, err)) = inner.failures.get_mut(op) {
                if *allowed == 0 {
                    return Err(err.clone());
                }
                *allowed -= 1;
            }
            inner.gates.get(op).cloned()
        };
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| DataProtectorError::Request(e.to_string()))?
                .forget();
        }
        Ok(())
    }
}

fn new_record(inner: &mut ProtectorInner, owner: Address, name: &str) -> ProtectedDataRecord {
    inner.next_record += 1;
    ProtectedDataRecord {
        id: Address::with_last_byte(0xa0 + inner.next_record),
        owner,
        name: name.to_string(),
        schema: DataSchema::email(),
        created_at: Utc::now(),
    }
}

fn new_grant(
    inner: &mut ProtectorInner,
    protected_data: Address,
    user: AddressOrEnsName,
    app: AddressOrEnsName,
    uses: u32,
) -> AccessGrant {
    inner.next_grant += 1;
    AccessGrant {
        protected_data_id: protected_data,
        authorized_user: user,
        authorized_app: app,
        remaining_uses: uses,
        grant_id: GrantId(format!("0x{:04x}", inner.next_grant)),
    }
}

#[async_trait]
impl DataProtector for MockProtector {
    async fn protect(&self, params: &ProtectParams) -> Result<ProtectedDataRecord, DataProtectorError> {
        self.enter("protect").await?;
        let mut inner = self.inner.lock().unwrap();
        let record = new_record(&mut inner, params.owner, &params.name);
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn list_owned(&self, owner: &Address) -> Result<Vec<ProtectedDataRecord>, DataProtectorError> {
        self.enter("list_owned").await?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .filter(|record| &record.owner == owner)
            .cloned()
            .collect())
    }

    async fn grant_access(&self, params: &GrantAccessParams) -> Result<AccessGrant, DataProtectorError> {
        self.enter("grant").await?;
        let mut inner = self.inner.lock().unwrap();
        let grant = new_grant(
            &mut inner,
            params.protected_data,
            params.authorized_user.clone(),
            params.authorized_app.clone(),
            params.number_of_access,
        );
        inner.grants.push(grant.clone());
        Ok(grant)
    }

    async fn list_granted_access(&self, filter: &GrantFilter) -> Result<GrantedAccessList, DataProtectorError> {
        self.enter("list_grants").await?;
        let inner = self.inner.lock().unwrap();
        let grants: Vec<AccessGrant> = inner
            .grants
            .iter()
            .filter(|grant| filter.matches(grant))
            .cloned()
            .collect();
        Ok(GrantedAccessList {
            count: grants.len(),
            grants,
        })
    }

    async fn revoke_access(&self, grant: &AccessGrant) -> Result<RevokeReceipt, DataProtectorError> {
        self.enter("revoke").await?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.grants.len();
        inner.grants.retain(|g| g.grant_id != grant.grant_id);
        if inner.grants.len() == before {
            return Err(DataProtectorError::NotFound(format!(
                "grant {} does not exist",
                grant.grant_id
            )));
        }
        Ok(RevokeReceipt {
            grant_id: grant.grant_id.clone(),
            tx_hash: format!("0xtx{}", grant.grant_id.0.trim_start_matches("0x")),
        })
    }

    async fn fetch_accessible_records(
        &self,
        user: &Address,
        strict: bool,
    ) -> Result<Vec<AccessibleRecord>, DataProtectorError> {
        self.enter("contacts").await?;
        let inner = self.inner.lock().unwrap();
        let user = AddressOrEnsName::Address(*user);
        let anyone = AddressOrEnsName::Address(Address::ZERO);
        Ok(inner
            .grants
            .iter()
            .filter(|grant| grant.authorized_user == user || (!strict && grant.authorized_user == anyone))
            .filter_map(|grant| {
                inner
                    .records
                    .iter()
                    .find(|record| record.id == grant.protected_data_id)
                    .map(|record| AccessibleRecord {
                        record: record.clone(),
                        remaining_uses: grant.remaining_uses,
                        access_granted_at: record.created_at,
                    })
            })
            .collect())
    }

    async fn consume(&self, params: &ConsumeParams) -> Result<ConsumeAck, DataProtectorError> {
        self.enter("consume").await?;
        let mut inner = self.inner.lock().unwrap();
        let user = AddressOrEnsName::Address(params.consumer);
        let grant = inner.grants.iter_mut().find(|grant| {
            grant.covers(&params.protected_data, &user, &params.authorized_app) && grant.remaining_uses > 0
        });
        match grant {
            Some(grant) => {
                grant.remaining_uses -= 1;
                Ok(ConsumeAck {
                    task_id: format!("task-{}-{}", grant.grant_id, grant.remaining_uses),
                })
            }
            None => Err(DataProtectorError::AccessDenied(
                "No dataset order found for this user and app".to_string(),
            )),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Default)]
struct RegistryInner {
    registered: HashMap<Address, String>,
    failure: Option<RegistryError>,
    calls: usize,
}

#[derive(Default)]
pub struct MockRegistry {
    inner: Mutex<RegistryInner>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, err: RegistryError) {
        self.inner.lock().unwrap().failure = Some(err);
    }

    pub fn recover(&self) {
        self.inner.lock().unwrap().failure = None;
    }

    pub fn email_of(&self, address: &Address) -> Option<String> {
        self.inner.lock().unwrap().registered.get(address).cloned()
    }

    pub fn calls(&self) -> usize {
        self.inner.lock().unwrap().calls
    }
}

#[async_trait]
impl UserRegistry for MockRegistry {
    async fn exists_by_address(&self, address: &Address) -> Result<bool, RegistryError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls += 1;
        if let Some(err) = inner.failure.clone() {
            return Err(err);
        }
        Ok(inner.registered.contains_key(address))
    }

    async fn register_email(&self, address: &Address, email: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls += 1;
        if let Some(err) = inner.failure.clone() {
            return Err(err);
        }
        inner.registered.insert(*address, email.to_string());
        Ok(())
    }
}
