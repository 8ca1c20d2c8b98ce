// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Lifecycle Controller
//!
//! Drives one protected data record through protection, registration,
//! grants, consumption and revocation, and tracks its [`LifecycleState`].
//!
//! ## Ordering
//!
//! Pipelines on the same key are serialized by a per-key async mutex; a
//! second request waits for the first to settle. Different keys run
//! concurrently.
//!
//! A key is tracked once a pipeline reaches its external call, and dropped
//! again when it returns to `Unprotected`. Settled `draft:` keys are capped
//! at [`SETTLED_DRAFT_LIMIT`], oldest evicted first.
//!
//! ## Failures
//!
//! | Failure | Resulting state |
//! |---------|-----------------|
//! | Local validation | unchanged, no remote call |
//! | Wallet unavailable or network switch refused | unchanged |
//! | No active grant matching a revocation | unchanged |
//! | Gateway failure or denial | `Failed(reason)` |
//! | [`AccessLifecycleController::cancel`] | `Failed(Cancelled)` |
//!
//! Nothing is retried automatically. Registration with the backend is the
//! exception to the table above: it never fails the record, and a failed
//! registration can be replayed with
//! [`AccessLifecycleController::retry_registration`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::state::{FailureReason, LifecycleEntry, LifecycleKey, LifecycleState};
use super::validate;
use crate::blockchain::dataset_explorer_url;
use crate::error::AccessError;
use crate::protector::{
    AccessGrant, AddressOrEnsName, ConsumeParams, EmailData, EmailMessage, GrantAccessParams,
    GrantFilter, GrantId, GrantedAccessList, ProtectParams, ProtectedDataRecord, RevokeReceipt,
};
use crate::providers::UserRegistry;
use crate::store::ProtectedDataStore;

/// Per-deployment defaults applied to every request.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Application granted access when a request names none
    pub authorized_app: AddressOrEnsName,
    /// Sender name shown in consumed emails
    pub sender_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProtectOutcome {
    /// Submission key the pipeline ran under
    #[schema(value_type = String)]
    pub draft: LifecycleKey,
    pub record: ProtectedDataRecord,
    pub explorer_url: String,
    pub registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantOutcome {
    pub grant: AccessGrant,
    /// An active grant for the same triple already existed
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeOutcome {
    pub task_id: String,
    /// Remaining uses of the consumed grant, when it is known locally
    pub remaining_uses: Option<u32>,
}

/// Settled `draft:` keys kept for lookup.
pub const SETTLED_DRAFT_LIMIT: usize = 32;

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DedupeReport {
    pub kept: Vec<GrantId>,
    /// Revocations that went through, including those before a failure
    pub revoked: Vec<RevokeReceipt>,
    /// Revocation that stopped the run; later duplicates were left alone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<DedupeFailure>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DedupeFailure {
    pub grant_id: GrantId,
    pub error: String,
}

struct Slot {
    state: LifecycleState,
    updated_at: DateTime<Utc>,
    cancel: Option<CancellationToken>,
}

type SerialLocks = Mutex<HashMap<LifecycleKey, Arc<AsyncMutex<()>>>>;

/// Exclusive turn on one key.
///
/// The last turn out removes the key's lock.
struct SerialTurn<'a> {
    locks: &'a SerialLocks,
    key: LifecycleKey,
    guard: OwnedMutexGuard<()>,
}

impl Drop for SerialTurn<'_> {
    fn drop(&mut self) {
        let mut locks = locked(self.locks);
        // Held by the map and this turn only: nobody is queued.
        if Arc::strong_count(OwnedMutexGuard::mutex(&self.guard)) == 2 {
            locks.remove(&self.key);
        }
    }
}

#[derive(Debug, Clone)]
struct PendingRegistration {
    owner: Address,
    email: String,
}

pub struct AccessLifecycleController {
    store: ProtectedDataStore,
    registry: Arc<dyn UserRegistry>,
    settings: SessionSettings,
    slots: Mutex<HashMap<LifecycleKey, Slot>>,
    serials: SerialLocks,
    /// Grants seen per record, kept in step with local consumption
    grants: Mutex<HashMap<Address, Vec<AccessGrant>>>,
    pending: Mutex<HashMap<Address, PendingRegistration>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AccessLifecycleController {
    pub fn new(store: ProtectedDataStore, registry: Arc<dyn UserRegistry>, settings: SessionSettings) -> Self {
        Self {
            store,
            registry,
            settings,
            slots: Mutex::new(HashMap::new()),
            serials: Mutex::new(HashMap::new()),
            grants: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn store(&self) -> &ProtectedDataStore {
        &self.store
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Current state of `key`. Keys never seen are `Unprotected`.
    pub fn state(&self, key: &LifecycleKey) -> LifecycleState {
        locked(&self.slots)
            .get(key)
            .map(|slot| slot.state.clone())
            .unwrap_or(LifecycleState::Unprotected)
    }

    pub fn entry(&self, key: &LifecycleKey) -> Option<LifecycleEntry> {
        locked(&self.slots).get(key).map(|slot| LifecycleEntry {
            key: *key,
            state: slot.state.clone(),
            updated_at: slot.updated_at,
        })
    }

    /// Every tracked key, most recently updated first.
    pub fn snapshot(&self) -> Vec<LifecycleEntry> {
        let mut entries: Vec<LifecycleEntry> = locked(&self.slots)
            .iter()
            .map(|(key, slot)| LifecycleEntry {
                key: *key,
                state: slot.state.clone(),
                updated_at: slot.updated_at,
            })
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries
    }

    /// Grants last seen for `id`, including exhausted ones.
    pub fn known_grants(&self, id: &Address) -> Vec<AccessGrant> {
        locked(&self.grants).get(id).cloned().unwrap_or_default()
    }

    pub fn has_pending_registration(&self, id: &Address) -> bool {
        locked(&self.pending).contains_key(id)
    }

    /// Abort the external call running for `key`.
    ///
    /// The pipeline ends in `Failed(Cancelled)`.
    pub fn cancel(&self, key: &LifecycleKey) -> Result<(), AccessError> {
        let token = locked(&self.slots)
            .get(key)
            .and_then(|slot| slot.cancel.clone());
        match token {
            Some(token) => {
                info!(key = %key, "Cancelling in-flight operation");
                token.cancel();
                Ok(())
            }
            None => Err(AccessError::NotFound(format!(
                "No operation in flight for {key}"
            ))),
        }
    }

    /// Wait for every earlier pipeline on `key` to finish.
    async fn serial(&self, key: LifecycleKey) -> SerialTurn<'_> {
        let lock = locked(&self.serials)
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        SerialTurn {
            locks: &self.serials,
            key,
            guard: lock.lock_owned().await,
        }
    }

    fn set_state(&self, key: LifecycleKey, state: LifecycleState, cancel: Option<CancellationToken>) {
        debug!(key = %key, state = ?state, "Lifecycle transition");
        let mut slots = locked(&self.slots);
        if state == LifecycleState::Unprotected && cancel.is_none() {
            slots.remove(&key);
            return;
        }
        slots.insert(
            key,
            Slot {
                state,
                updated_at: Utc::now(),
                cancel,
            },
        );
        if matches!(key, LifecycleKey::Draft(_)) {
            prune_drafts(&mut slots);
        }
    }

    /// Run one external call for `key` in the `working` state.
    ///
    /// Failures before the call reaches the gateway put `previous` back;
    /// anything else leaves the key in `Failed`. On success the caller
    /// sets the next state.
    async fn run_remote<T, F>(
        &self,
        key: LifecycleKey,
        previous: LifecycleState,
        working: LifecycleState,
        fallback: fn(String) -> FailureReason,
        call: F,
    ) -> Result<T, AccessError>
    where
        F: Future<Output = Result<T, AccessError>>,
    {
        let token = CancellationToken::new();
        self.set_state(key, working, Some(token.clone()));

        let result = tokio::select! {
            _ = token.cancelled() => Err(AccessError::Cancelled),
            result = call => result,
        };

        if let Err(err) = &result {
            if err.is_preflight() || matches!(err, AccessError::NotFound(_)) {
                debug!(key = %key, error = %err, "Operation stopped before any remote effect");
                self.set_state(key, previous, None);
            } else {
                warn!(key = %key, error = %err, "Operation failed");
                self.set_state(key, LifecycleState::Failed(FailureReason::from_error(err, fallback)), None);
            }
        }
        result
    }

    async fn account(&self) -> Result<Address, AccessError> {
        match self.store.guard().wallet().account().await {
            Ok(Some(account)) => Ok(account),
            Ok(None) => Err(AccessError::ProviderUnavailable(
                "no wallet account connected".to_string(),
            )),
            Err(err) => Err(AccessError::ProviderUnavailable(err.message)),
        }
    }

    fn remember_grants(&self, id: Address, listed: &[AccessGrant]) {
        let mut grants = locked(&self.grants);
        let known = grants.entry(id).or_default();
        for grant in listed {
            match known.iter_mut().find(|g| g.grant_id == grant.grant_id) {
                Some(existing) => *existing = grant.clone(),
                None => known.push(grant.clone()),
            }
        }
    }

    fn forget_grant(&self, id: &Address, grant_id: &GrantId) {
        if let Some(known) = locked(&self.grants).get_mut(id) {
            known.retain(|g| &g.grant_id != grant_id);
        }
    }

    // =========================================================================
    // Protection
    // =========================================================================

    /// Protect an email address for the connected account, then register it
    /// with the backend.
    pub async fn protect(&self, email: &str, name: Option<&str>) -> Result<ProtectOutcome, AccessError> {
        let email = validate::normalize_email(email)?;
        let name = validate::normalize_name(name);

        let draft = LifecycleKey::draft();
        let _turn = self.serial(draft).await;

        let (owner, record) = self
            .run_remote(
                draft,
                LifecycleState::Unprotected,
                LifecycleState::Protecting,
                FailureReason::Protection,
                async {
                    let owner = self.account().await?;
                    let params = ProtectParams {
                        owner,
                        name,
                        data: EmailData { email: email.clone() },
                    };
                    let record = self.store.protect(&params).await?;
                    Ok((owner, record))
                },
            )
            .await?;

        info!(draft = %draft, protected_data = %record.id, owner = %owner, "Email protected");
        self.set_state(draft, LifecycleState::Protected, None);

        let key = LifecycleKey::Record(record.id);
        let _record_turn = self.serial(key).await;
        self.set_state(key, LifecycleState::Protected, None);

        let registration = self.register(key, owner, &email).await;
        if registration.is_err() {
            locked(&self.pending).insert(record.id, PendingRegistration { owner, email });
        }

        Ok(ProtectOutcome {
            draft,
            explorer_url: dataset_explorer_url(&record.id),
            registered: registration.is_ok(),
            registration_error: registration.err().map(|e| e.to_string()),
            record,
        })
    }

    /// `Protected -> Registering -> Protected`, whatever the outcome.
    async fn register(&self, key: LifecycleKey, owner: Address, email: &str) -> Result<(), AccessError> {
        let previous = self.state(&key);
        self.set_state(key, LifecycleState::Registering, None);

        let result = self
            .registry
            .register_email(&owner, email)
            .await
            .map_err(|e| AccessError::Registration(e.to_string()));

        match &result {
            Ok(()) => info!(key = %key, owner = %owner, "Registered with backend"),
            Err(err) => warn!(key = %key, owner = %owner, error = %err, "Backend registration failed"),
        }
        self.set_state(key, previous, None);
        result
    }

    /// Replay a registration that failed after protection.
    pub async fn retry_registration(&self, id: Address) -> Result<(), AccessError> {
        let key = LifecycleKey::Record(id);
        let _turn = self.serial(key).await;

        let pending = locked(&self.pending)
            .get(&id)
            .cloned()
            .ok_or_else(|| AccessError::NotFound(format!("No pending registration for {id}")))?;

        self.register(key, pending.owner, &pending.email).await?;
        locked(&self.pending).remove(&id);
        Ok(())
    }

    /// Protected data owned by the connected account.
    pub async fn list_owned(&self) -> Result<Vec<ProtectedDataRecord>, AccessError> {
        let owner = self.account().await?;
        self.store.list_owned(&owner).await
    }

    // =========================================================================
    // Grants
    // =========================================================================

    /// Grant `authorized_user` access to `id`.
    ///
    /// An active grant for the same (record, user, app) is returned as is.
    pub async fn grant(
        &self,
        id: Address,
        authorized_user: AddressOrEnsName,
        authorized_app: Option<AddressOrEnsName>,
        number_of_access: Option<u32>,
    ) -> Result<GrantOutcome, AccessError> {
        let number_of_access = validate::number_of_access(number_of_access)?;
        let authorized_app = authorized_app.unwrap_or_else(|| self.settings.authorized_app.clone());

        let key = LifecycleKey::Record(id);
        let _turn = self.serial(key).await;
        let previous = self.state(&key);

        let outcome = self
            .run_remote(key, previous, LifecycleState::Granting, FailureReason::Grant, async {
                let filter = GrantFilter::triple(id, authorized_user.clone(), authorized_app.clone());
                let existing = self.store.list_granted_access(&filter).await?;
                self.remember_grants(id, &existing.grants);

                if let Some(grant) = existing.grants.into_iter().find(|g| g.remaining_uses > 0) {
                    return Ok(GrantOutcome { grant, reused: true });
                }

                let params = GrantAccessParams {
                    protected_data: id,
                    authorized_user: authorized_user.clone(),
                    authorized_app: authorized_app.clone(),
                    number_of_access,
                };
                let grant = self.store.grant_access(&params).await?;
                Ok(GrantOutcome { grant, reused: false })
            })
            .await?;

        info!(
            protected_data = %id,
            authorized_user = %outcome.grant.authorized_user,
            grant_id = %outcome.grant.grant_id,
            reused = outcome.reused,
            "Access granted"
        );
        self.remember_grants(id, std::slice::from_ref(&outcome.grant));
        self.set_state(key, LifecycleState::Granted, None);
        Ok(outcome)
    }

    /// Grants of `id`, optionally narrowed to one user or app.
    pub async fn list_grants(
        &self,
        id: Address,
        authorized_user: Option<AddressOrEnsName>,
        authorized_app: Option<AddressOrEnsName>,
    ) -> Result<GrantedAccessList, AccessError> {
        let filter = GrantFilter {
            protected_data: Some(id),
            authorized_user,
            authorized_app,
        };
        let list = self.store.list_granted_access(&filter).await?;
        self.remember_grants(id, &list.grants);
        Ok(list)
    }

    /// Revoke the active grant of `authorized_user` on `id`.
    ///
    /// Exhausted grants are never picked. With several active matches,
    /// `grant_id` picks one; without it the first listed is revoked.
    pub async fn revoke(
        &self,
        id: Address,
        authorized_user: AddressOrEnsName,
        authorized_app: Option<AddressOrEnsName>,
        grant_id: Option<GrantId>,
    ) -> Result<RevokeReceipt, AccessError> {
        let authorized_app = authorized_app.unwrap_or_else(|| self.settings.authorized_app.clone());

        let key = LifecycleKey::Record(id);
        let _turn = self.serial(key).await;
        let previous = self.state(&key);

        let receipt = self
            .run_remote(key, previous, LifecycleState::Revoking, FailureReason::Revocation, async {
                let filter = GrantFilter::triple(id, authorized_user.clone(), authorized_app.clone());
                let listed = self
                    .store
                    .list_granted_access(&filter)
                    .await
                    .map_err(as_revocation)?
                    .grants;

                let grant = select_grant(listed, grant_id.as_ref()).ok_or_else(|| {
                    AccessError::NotFound(format!(
                        "No active grant of {id} found for {authorized_user} and {authorized_app}"
                    ))
                })?;
                self.store.revoke_access(&grant).await
            })
            .await?;

        info!(protected_data = %id, grant_id = %receipt.grant_id, tx_hash = %receipt.tx_hash, "Access revoked");
        self.forget_grant(&id, &receipt.grant_id);
        self.set_state(key, LifecycleState::Protected, None);
        Ok(receipt)
    }

    /// Keep one grant of every (user, app) pair on `id` and revoke the rest.
    ///
    /// The kept grant is the first listed with uses left, or the first
    /// listed when all are exhausted. A failed revocation stops the run:
    /// the report carries the receipts obtained so far and the failure, and
    /// the key is left `Failed`.
    pub async fn deduplicate_grants(&self, id: Address) -> Result<DedupeReport, AccessError> {
        let key = LifecycleKey::Record(id);
        let _turn = self.serial(key).await;
        let previous = self.state(&key);

        let (report, failure) = self
            .run_remote(key, previous.clone(), LifecycleState::Revoking, FailureReason::Revocation, async {
                let filter = GrantFilter {
                    protected_data: Some(id),
                    ..Default::default()
                };
                let listed = self
                    .store
                    .list_granted_access(&filter)
                    .await
                    .map_err(as_revocation)?
                    .grants;

                let (kept, duplicates) = split_duplicates(listed);
                let mut report = DedupeReport {
                    kept: kept.into_iter().map(|g| g.grant_id).collect(),
                    revoked: Vec::with_capacity(duplicates.len()),
                    failed: None,
                };
                for grant in duplicates {
                    match self.store.revoke_access(&grant).await {
                        Ok(receipt) => {
                            self.forget_grant(&id, &receipt.grant_id);
                            report.revoked.push(receipt);
                        }
                        Err(err) => {
                            report.failed = Some(DedupeFailure {
                                grant_id: grant.grant_id,
                                error: err.to_string(),
                            });
                            return Ok((report, Some(err)));
                        }
                    }
                }
                Ok((report, None))
            })
            .await?;

        if !report.revoked.is_empty() {
            info!(protected_data = %id, revoked = report.revoked.len(), "Duplicate grants revoked");
        }
        match failure {
            Some(err) => {
                warn!(protected_data = %id, error = %err, revoked = report.revoked.len(), "Deduplication stopped");
                let reason = FailureReason::from_error(&err, FailureReason::Revocation);
                self.set_state(key, LifecycleState::Failed(reason), None);
            }
            None => self.set_state(key, previous, None),
        }
        Ok(report)
    }

    // =========================================================================
    // Consumption
    // =========================================================================

    /// Send an email to the owner of `id` as the connected account.
    ///
    /// The grant is not checked locally; the gateway decides.
    pub async fn consume(&self, id: Address, subject: &str, content: &str) -> Result<ConsumeOutcome, AccessError> {
        let (subject, content) = validate::email_message(subject, content)?;
        let authorized_app = self.settings.authorized_app.clone();

        let key = LifecycleKey::Record(id);
        let _turn = self.serial(key).await;
        let previous = self.state(&key);

        let (consumer, ack) = self
            .run_remote(key, previous, LifecycleState::Consuming, FailureReason::Consumption, async {
                let consumer = self.account().await?;
                let params = ConsumeParams {
                    protected_data: id,
                    consumer,
                    authorized_app: authorized_app.clone(),
                    message: EmailMessage {
                        subject,
                        content,
                        sender_name: self.settings.sender_name.clone(),
                    },
                };
                let ack = self.store.consume(&params).await?;
                Ok((consumer, ack))
            })
            .await?;

        let remaining_uses = self.use_local_grant(&id, &AddressOrEnsName::Address(consumer), &authorized_app);
        info!(protected_data = %id, consumer = %consumer, task_id = %ack.task_id, remaining_uses = ?remaining_uses, "Email sent");
        self.set_state(key, LifecycleState::Granted, None);

        Ok(ConsumeOutcome {
            task_id: ack.task_id,
            remaining_uses,
        })
    }

    fn use_local_grant(&self, id: &Address, user: &AddressOrEnsName, app: &AddressOrEnsName) -> Option<u32> {
        let mut grants = locked(&self.grants);
        let grant = grants
            .get_mut(id)?
            .iter_mut()
            .find(|g| g.covers(id, user, app) && g.remaining_uses > 0)?;
        grant.remaining_uses -= 1;
        Some(grant.remaining_uses)
    }
}

fn as_revocation(err: AccessError) -> AccessError {
    match err {
        AccessError::Grant(message) => AccessError::Revocation(message),
        other => other,
    }
}

fn select_grant(listed: Vec<AccessGrant>, grant_id: Option<&GrantId>) -> Option<AccessGrant> {
    let mut active = listed.into_iter().filter(|g| g.remaining_uses > 0);
    match grant_id {
        Some(grant_id) => active.find(|g| &g.grant_id == grant_id),
        None => {
            let active: Vec<AccessGrant> = active.collect();
            if active.len() > 1 {
                warn!(matches = active.len(), "Several active grants match, revoking the first listed");
            }
            active.into_iter().next()
        }
    }
}

/// One grant per (user, app) pair, preferring one with uses left, and
/// every other grant of the pair.
fn split_duplicates(listed: Vec<AccessGrant>) -> (Vec<AccessGrant>, Vec<AccessGrant>) {
    let mut kept: Vec<AccessGrant> = Vec::new();
    let mut duplicates = Vec::new();
    for grant in listed {
        let pair = kept
            .iter_mut()
            .find(|k| k.authorized_user == grant.authorized_user && k.authorized_app == grant.authorized_app);
        match pair {
            None => kept.push(grant),
            Some(held) if held.remaining_uses == 0 && grant.remaining_uses > 0 => {
                duplicates.push(std::mem::replace(held, grant));
            }
            Some(_) => duplicates.push(grant),
        }
    }
    (kept, duplicates)
}

/// Evict the oldest settled drafts beyond [`SETTLED_DRAFT_LIMIT`].
fn prune_drafts(slots: &mut HashMap<LifecycleKey, Slot>) {
    let mut settled: Vec<(DateTime<Utc>, LifecycleKey)> = slots
        .iter()
        .filter(|(key, slot)| matches!(key, LifecycleKey::Draft(_)) && !slot.state.is_in_flight())
        .map(|(key, slot)| (slot.updated_at, *key))
        .collect();
    if settled.len() <= SETTLED_DRAFT_LIMIT {
        return;
    }
    settled.sort_by_key(|(updated_at, _)| *updated_at);
    let excess = settled.len() - SETTLED_DRAFT_LIMIT;
    for (_, key) in settled.into_iter().take(excess) {
        slots.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{ChainGuard, WalletError, IEXEC_SIDECHAIN, USER_REJECTED_CODE};
    use crate::protector::DataProtectorError;
    use crate::providers::RegistryError;
    use crate::test_support::{
        consumer, mail_app, owner, settle, MockProtector, MockRegistry, MockWallet, BELLECOUR,
    };

    struct Harness {
        wallet: Arc<MockWallet>,
        protector: Arc<MockProtector>,
        registry: Arc<MockRegistry>,
        controller: Arc<AccessLifecycleController>,
    }

    fn harness(wallet: MockWallet) -> Harness {
        let wallet = Arc::new(wallet);
        let protector = Arc::new(MockProtector::new());
        let registry = Arc::new(MockRegistry::new());
        let guard = Arc::new(ChainGuard::new(wallet.clone(), IEXEC_SIDECHAIN));
        let store = ProtectedDataStore::new(guard, protector.clone());
        let settings = SessionSettings {
            authorized_app: mail_app(),
            sender_name: "Relational".to_string(),
        };
        let controller = Arc::new(AccessLifecycleController::new(store, registry.clone(), settings));
        Harness {
            wallet,
            protector,
            registry,
            controller,
        }
    }

    fn synced() -> Harness {
        harness(MockWallet::on_chain(BELLECOUR))
    }

    fn user() -> AddressOrEnsName {
        AddressOrEnsName::Address(consumer())
    }

    #[tokio::test]
    async fn empty_email_fails_without_remote_calls() {
        let h = harness(MockWallet::on_chain(1));

        let err = h.controller.protect("   ", Some("work")).await.unwrap_err();

        assert!(err.is_local());
        assert_eq!(h.protector.total_calls(), 0);
        assert!(h.wallet.switch_calls().is_empty());
        assert_eq!(h.registry.calls(), 0);
        assert!(h.controller.snapshot().is_empty());
    }

    #[tokio::test]
    async fn protect_registers_email_with_backend() {
        let h = harness(MockWallet::on_chain(1));

        let outcome = h.controller.protect(" alice@example.com ", Some("work")).await.unwrap();

        assert!(outcome.registered);
        assert_eq!(outcome.record.owner, owner());
        assert!(outcome.explorer_url.ends_with(&outcome.record.id.to_string()));
        assert_eq!(h.wallet.switch_calls(), vec![BELLECOUR]);
        assert_eq!(h.registry.email_of(&owner()).as_deref(), Some("alice@example.com"));
        assert_eq!(h.controller.state(&outcome.draft), LifecycleState::Protected);
        assert_eq!(
            h.controller.state(&LifecycleKey::Record(outcome.record.id)),
            LifecycleState::Protected
        );
    }

    #[tokio::test]
    async fn protect_failure_is_terminal_for_the_attempt() {
        let h = synced();
        h.protector.fail("protect", DataProtectorError::Rejected("tx reverted".into()));

        let err = h.controller.protect("alice@example.com", None).await.unwrap_err();

        assert_eq!(err, AccessError::Protection("tx reverted".into()));
        let entries = h.controller.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].state,
            LifecycleState::Failed(FailureReason::Protection("tx reverted".into()))
        );
        assert_eq!(h.protector.call_count("protect"), 1);
        assert_eq!(h.registry.calls(), 0);
    }

    #[tokio::test]
    async fn registration_failure_keeps_record_and_can_be_retried() {
        let h = synced();
        h.registry.fail(RegistryError::Rejected {
            status: 500,
            message: "db down".into(),
        });

        let outcome = h.controller.protect("alice@example.com", None).await.unwrap();
        let id = outcome.record.id;

        assert!(!outcome.registered);
        assert!(outcome.registration_error.unwrap().contains("db down"));
        assert_eq!(h.controller.state(&id.into()), LifecycleState::Protected);
        assert!(h.controller.has_pending_registration(&id));

        h.registry.recover();
        h.controller.retry_registration(id).await.unwrap();

        assert_eq!(h.registry.email_of(&owner()).as_deref(), Some("alice@example.com"));
        assert!(!h.controller.has_pending_registration(&id));
        assert!(matches!(
            h.controller.retry_registration(id).await,
            Err(AccessError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn consume_decrements_remaining_uses() {
        let h = harness(MockWallet::on_chain(BELLECOUR).with_account(Some(consumer())));
        let record = h.protector.seed_record(owner(), "work");

        let granted = h.controller.grant(record.id, user(), None, Some(3)).await.unwrap();
        assert!(!granted.reused);
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Granted);

        let outcome = h.controller.consume(record.id, "Hello", "Body").await.unwrap();

        assert_eq!(outcome.remaining_uses, Some(2));
        assert_eq!(h.protector.grants()[0].remaining_uses, 2);
        assert_eq!(h.controller.known_grants(&record.id)[0].remaining_uses, 2);
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Granted);
    }

    #[tokio::test]
    async fn second_consume_of_single_use_grant_is_denied() {
        let h = harness(MockWallet::on_chain(BELLECOUR).with_account(Some(consumer())));
        let record = h.protector.seed_record(owner(), "work");
        h.controller.grant(record.id, user(), Some(mail_app()), Some(1)).await.unwrap();

        let first = h.controller.consume(record.id, "Hi", "One").await.unwrap();
        assert_eq!(first.remaining_uses, Some(0));

        let err = h.controller.consume(record.id, "Hi", "Two").await.unwrap_err();

        assert!(matches!(err, AccessError::Permission(_)));
        assert!(matches!(
            h.controller.state(&record.id.into()),
            LifecycleState::Failed(FailureReason::Permission(_))
        ));
        assert_eq!(h.protector.call_count("consume"), 2);
    }

    #[tokio::test]
    async fn invalid_message_is_rejected_before_consuming() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");

        let err = h.controller.consume(record.id, "", "Body").await.unwrap_err();

        assert!(err.is_local());
        assert_eq!(h.protector.total_calls(), 0);
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Unprotected);
    }

    #[tokio::test]
    async fn repeated_grant_reuses_active_grant() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");

        let first = h.controller.grant(record.id, user(), None, None).await.unwrap();
        let second = h.controller.grant(record.id, user(), None, None).await.unwrap();

        assert!(second.reused);
        assert_eq!(first.grant.grant_id, second.grant.grant_id);
        assert_eq!(first.grant.remaining_uses, 1);
        assert_eq!(h.protector.call_count("grant"), 1);
    }

    #[tokio::test]
    async fn zero_access_count_is_a_validation_error() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");

        let err = h.controller.grant(record.id, user(), None, Some(0)).await.unwrap_err();

        assert!(err.is_local());
        assert_eq!(h.protector.total_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_grants_on_one_record_are_serialized() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");
        h.protector.hold("grant");

        let first = tokio::spawn({
            let controller = h.controller.clone();
            async move { controller.grant(record.id, user(), None, Some(2)).await }
        });
        let second = tokio::spawn({
            let controller = h.controller.clone();
            async move { controller.grant(record.id, user(), None, Some(2)).await }
        });
        settle().await;

        // One pipeline is parked in the gateway, the other waits its turn.
        assert_eq!(h.protector.call_count("list_grants"), 1);
        assert_eq!(h.protector.call_count("grant"), 1);
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Granting);

        h.protector.release("grant", 1);
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(h.protector.grants().len(), 1);
        assert_ne!(first.reused, second.reused);
        assert_eq!(first.grant.grant_id, second.grant.grant_id);
        assert!(locked(&h.controller.serials).is_empty());
    }

    #[tokio::test]
    async fn different_records_run_concurrently() {
        let h = synced();
        let held = h.protector.seed_record(owner(), "held");
        let other = h.protector.seed_record(owner(), "other");
        h.protector.hold("consume");

        let pending = tokio::spawn({
            let controller = h.controller.clone();
            async move { controller.consume(held.id, "Hi", "Body").await }
        });
        settle().await;
        assert_eq!(h.controller.state(&held.id.into()), LifecycleState::Consuming);

        h.controller.grant(other.id, user(), None, None).await.unwrap();
        assert_eq!(h.controller.state(&other.id.into()), LifecycleState::Granted);

        h.protector.release("consume", 1);
        // Owner holds no grant on its own record.
        assert!(matches!(pending.await.unwrap(), Err(AccessError::Permission(_))));
    }

    #[tokio::test]
    async fn failure_on_one_record_leaves_others_alone() {
        let h = synced();
        let a = h.protector.seed_record(owner(), "a");
        let b = h.protector.seed_record(owner(), "b");
        h.controller.grant(b.id, user(), None, None).await.unwrap();

        h.protector.fail("grant", DataProtectorError::Rejected("out of gas".into()));
        let err = h.controller.grant(a.id, user(), None, None).await.unwrap_err();

        assert_eq!(err, AccessError::Grant("out of gas".into()));
        assert_eq!(
            h.controller.state(&a.id.into()),
            LifecycleState::Failed(FailureReason::Grant("out of gas".into()))
        );
        assert_eq!(h.controller.state(&b.id.into()), LifecycleState::Granted);

        // Resubmission after a failure is allowed.
        h.protector.clear_failure("grant");
        h.controller.grant(a.id, user(), None, None).await.unwrap();
        assert_eq!(h.controller.state(&a.id.into()), LifecycleState::Granted);
    }

    #[tokio::test]
    async fn refused_network_switch_leaves_state_unchanged() {
        let rejected = WalletError::new(USER_REJECTED_CODE, "User rejected the request.");
        let h = harness(MockWallet::on_chain(1).reject_switch(rejected.clone()));
        let record = h.protector.seed_record(owner(), "work");
        h.protector.seed_grant(record.id, user(), mail_app(), 1);
        h.controller.set_state(record.id.into(), LifecycleState::Granted, None);

        let err = h.controller.revoke(record.id, user(), None, None).await.unwrap_err();

        assert_eq!(err, AccessError::Network(rejected));
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Granted);
        assert_eq!(h.protector.total_calls(), 0);
        assert_eq!(h.protector.grants().len(), 1);
    }

    #[tokio::test]
    async fn revoke_without_matching_grant_is_not_found() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");
        h.controller.grant(record.id, user(), None, None).await.unwrap();

        let stranger = AddressOrEnsName::Address(Address::with_last_byte(0xcc));
        let err = h.controller.revoke(record.id, stranger, None, None).await.unwrap_err();

        assert!(matches!(err, AccessError::NotFound(_)));
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Granted);
        assert_eq!(h.protector.call_count("revoke"), 0);
    }

    #[tokio::test]
    async fn revoke_picks_requested_grant_among_duplicates() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");
        h.protector.seed_grant(record.id, user(), mail_app(), 1);
        let second = h.protector.seed_grant(record.id, user(), mail_app(), 1);

        let receipt = h
            .controller
            .revoke(record.id, user(), None, Some(second.grant_id.clone()))
            .await
            .unwrap();

        assert_eq!(receipt.grant_id, second.grant_id);
        assert_eq!(h.protector.grants().len(), 1);
        assert_ne!(h.protector.grants()[0].grant_id, second.grant_id);
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Protected);
    }

    #[tokio::test]
    async fn gateway_revocation_failure_is_recorded() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");
        h.protector.seed_grant(record.id, user(), mail_app(), 1);
        h.protector.fail("revoke", DataProtectorError::Rejected("nonce too low".into()));

        let err = h.controller.revoke(record.id, user(), None, None).await.unwrap_err();

        assert_eq!(err, AccessError::Revocation("nonce too low".into()));
        assert_eq!(
            h.controller.state(&record.id.into()),
            LifecycleState::Failed(FailureReason::Revocation("nonce too low".into()))
        );
    }

    #[tokio::test]
    async fn deduplicate_keeps_first_grant_per_pair() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");
        let other = AddressOrEnsName::Address(Address::with_last_byte(0xcc));
        let keep = h.protector.seed_grant(record.id, user(), mail_app(), 1);
        h.protector.seed_grant(record.id, user(), mail_app(), 1);
        h.protector.seed_grant(record.id, user(), mail_app(), 4);
        let keep_other = h.protector.seed_grant(record.id, other, mail_app(), 1);

        let report = h.controller.deduplicate_grants(record.id).await.unwrap();

        assert_eq!(report.kept, vec![keep.grant_id, keep_other.grant_id]);
        assert_eq!(report.revoked.len(), 2);
        assert_eq!(h.protector.grants().len(), 2);
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Unprotected);
    }

    #[tokio::test]
    async fn cancel_fails_the_in_flight_pipeline() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");
        h.protector.hold("grant");

        let pending = tokio::spawn({
            let controller = h.controller.clone();
            async move { controller.grant(record.id, user(), None, None).await }
        });
        settle().await;

        h.controller.cancel(&record.id.into()).unwrap();
        let err = pending.await.unwrap().unwrap_err();

        assert_eq!(err, AccessError::Cancelled);
        assert_eq!(
            h.controller.state(&record.id.into()),
            LifecycleState::Failed(FailureReason::Cancelled)
        );
        assert!(matches!(
            h.controller.cancel(&record.id.into()),
            Err(AccessError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_owned_uses_connected_account() {
        let h = synced();
        h.protector.seed_record(owner(), "mine");
        h.protector.seed_record(consumer(), "theirs");

        let owned = h.controller.list_owned().await.unwrap();

        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].name, "mine");
    }

    #[tokio::test]
    async fn no_account_is_provider_unavailable() {
        let h = harness(MockWallet::on_chain(BELLECOUR).with_account(None));
        let record = h.protector.seed_record(owner(), "work");

        let err = h.controller.consume(record.id, "Hi", "Body").await.unwrap_err();

        assert!(matches!(err, AccessError::ProviderUnavailable(_)));
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Unprotected);
        assert_eq!(h.protector.total_calls(), 0);
    }

    #[tokio::test]
    async fn revoke_skips_exhausted_grants() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");
        let exhausted = h.protector.seed_grant(record.id, user(), mail_app(), 0);
        let active = h.protector.seed_grant(record.id, user(), mail_app(), 5);

        let receipt = h.controller.revoke(record.id, user(), None, None).await.unwrap();

        assert_eq!(receipt.grant_id, active.grant_id);
        let left: Vec<GrantId> = h.protector.grants().into_iter().map(|g| g.grant_id).collect();
        assert_eq!(left, vec![exhausted.grant_id]);
    }

    #[tokio::test]
    async fn revoke_after_uses_run_out_is_not_found() {
        let h = harness(MockWallet::on_chain(BELLECOUR).with_account(Some(consumer())));
        let record = h.protector.seed_record(owner(), "work");
        h.controller.grant(record.id, user(), None, Some(1)).await.unwrap();
        h.controller.consume(record.id, "Hi", "Body").await.unwrap();

        let err = h.controller.revoke(record.id, user(), None, None).await.unwrap_err();

        assert!(matches!(err, AccessError::NotFound(_)));
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Granted);
        assert_eq!(h.protector.call_count("revoke"), 0);
        assert_eq!(h.protector.grants().len(), 1);
    }

    #[tokio::test]
    async fn deduplicate_keeps_a_grant_with_uses_left() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");
        let exhausted = h.protector.seed_grant(record.id, user(), mail_app(), 0);
        let active = h.protector.seed_grant(record.id, user(), mail_app(), 3);

        let report = h.controller.deduplicate_grants(record.id).await.unwrap();

        assert_eq!(report.kept, vec![active.grant_id.clone()]);
        assert_eq!(report.revoked.len(), 1);
        assert_eq!(report.revoked[0].grant_id, exhausted.grant_id);
        assert_eq!(h.protector.grants()[0].grant_id, active.grant_id);
    }

    #[tokio::test]
    async fn failed_deduplication_reports_revocations_already_made() {
        let h = synced();
        let record = h.protector.seed_record(owner(), "work");
        let keep = h.protector.seed_grant(record.id, user(), mail_app(), 1);
        let revoked = h.protector.seed_grant(record.id, user(), mail_app(), 1);
        let stuck = h.protector.seed_grant(record.id, user(), mail_app(), 1);
        h.protector
            .fail_after("revoke", 1, DataProtectorError::Rejected("nonce too low".into()));

        let report = h.controller.deduplicate_grants(record.id).await.unwrap();

        assert_eq!(report.kept, vec![keep.grant_id]);
        assert_eq!(report.revoked.len(), 1);
        assert_eq!(report.revoked[0].grant_id, revoked.grant_id);
        let failed = report.failed.unwrap();
        assert_eq!(failed.grant_id, stuck.grant_id);
        assert!(failed.error.contains("nonce too low"));
        assert_eq!(h.protector.grants().len(), 2);
        assert_eq!(
            h.controller.state(&record.id.into()),
            LifecycleState::Failed(FailureReason::Revocation("nonce too low".into()))
        );
    }

    #[tokio::test]
    async fn consume_failure_is_recorded_and_not_retried() {
        let h = harness(MockWallet::on_chain(BELLECOUR).with_account(Some(consumer())));
        let record = h.protector.seed_record(owner(), "work");
        h.controller.grant(record.id, user(), None, Some(2)).await.unwrap();
        h.protector.fail("consume", DataProtectorError::Rejected("enclave crashed".into()));

        let err = h.controller.consume(record.id, "Hi", "Body").await.unwrap_err();

        assert_eq!(err, AccessError::Consumption("enclave crashed".into()));
        assert_eq!(
            h.controller.state(&record.id.into()),
            LifecycleState::Failed(FailureReason::Consumption("enclave crashed".into()))
        );
        assert_eq!(h.protector.call_count("consume"), 1);
        assert_eq!(h.controller.known_grants(&record.id)[0].remaining_uses, 2);
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_network_switch() {
        let h = harness(MockWallet::on_chain(1));
        let record = h.protector.seed_record(owner(), "work");
        h.wallet.hold_switch();

        let pending = tokio::spawn({
            let controller = h.controller.clone();
            async move { controller.grant(record.id, user(), None, None).await }
        });
        settle().await;
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Granting);
        assert_eq!(h.wallet.switch_calls(), vec![BELLECOUR]);

        h.controller.cancel(&record.id.into()).unwrap();

        assert_eq!(pending.await.unwrap().unwrap_err(), AccessError::Cancelled);
        assert_eq!(
            h.controller.state(&record.id.into()),
            LifecycleState::Failed(FailureReason::Cancelled)
        );
        assert_eq!(h.protector.total_calls(), 0);

        // The abandoned prompt does not block the next request.
        h.wallet.release_switch();
        h.controller.grant(record.id, user(), None, None).await.unwrap();
        assert_eq!(h.wallet.switch_calls(), vec![BELLECOUR, BELLECOUR]);
        assert_eq!(h.controller.state(&record.id.into()), LifecycleState::Granted);
    }

    #[tokio::test]
    async fn preflight_failures_leave_no_lifecycle_entries() {
        let h = harness(MockWallet::on_chain(BELLECOUR).with_account(None));

        for last in 1..=50u8 {
            let err = h
                .controller
                .consume(Address::with_last_byte(last), "Hi", "Body")
                .await
                .unwrap_err();
            assert!(matches!(err, AccessError::ProviderUnavailable(_)));
        }

        assert!(h.controller.snapshot().is_empty());
        assert!(locked(&h.controller.serials).is_empty());
    }

    #[tokio::test]
    async fn settled_drafts_are_capped() {
        let h = synced();
        h.protector.fail("protect", DataProtectorError::Rejected("tx reverted".into()));

        for _ in 0..SETTLED_DRAFT_LIMIT + 5 {
            h.controller.protect("alice@example.com", None).await.unwrap_err();
        }

        let entries = h.controller.snapshot();
        assert_eq!(entries.len(), SETTLED_DRAFT_LIMIT);
        assert!(entries.iter().all(|entry| entry.state.is_failed()));
        assert_eq!(h.protector.call_count("protect"), SETTLED_DRAFT_LIMIT + 5);
    }
}
