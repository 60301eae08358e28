//! In-memory account store for Tessera authentication schemes.
//!
//! [`InMemoryAccountStore`] implements [`AccountStore`] on concurrent hash
//! maps. It enforces the same uniqueness rules as the PostgreSQL store:
//!
//! - one binding per `(scheme, username)`
//! - at most one binding per scheme for a given account
//!
//! Violations are reported as [`StoreError::Conflict`]. Data lives only as
//! long as the store; it is meant for tests and single-node deployments.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera_auth::FederatedAuthenticator;
//! use tessera_auth_memory::InMemoryAccountStore;
//!
//! let store = Arc::new(InMemoryAccountStore::new());
//! let authenticator = FederatedAuthenticator::new(store.clone());
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tessera_auth::{
    Account, AccountId, AccountStore, AuthBinding, Credential, StoreError, StoreResult,
};

type BindingKey = (String, String);

/// Account store backed by concurrent in-memory maps.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<AccountId, Account>,
    /// `(scheme, username)` -> binding.
    bindings: DashMap<BindingKey, AuthBinding>,
    /// `(scheme, account)` -> username; enforces one binding per scheme.
    owners: DashMap<(String, AccountId), String>,
    credentials: DashMap<AccountId, Vec<Credential>>,
}

impl InMemoryAccountStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the account with `id`.
    #[must_use]
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).map(|a| a.clone())
    }

    /// Returns a copy of the binding for `(scheme, username)`.
    #[must_use]
    pub fn binding(&self, scheme: &str, username: &str) -> Option<AuthBinding> {
        self.bindings
            .get(&(scheme.to_string(), username.to_string()))
            .map(|b| b.clone())
    }

    /// Returns the credentials recorded for `account`.
    #[must_use]
    pub fn credentials(&self, account: AccountId) -> Vec<Credential> {
        self.credentials
            .get(&account)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Number of accounts.
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Number of bindings.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_binding(
        &self,
        scheme: &str,
        username: &str,
    ) -> StoreResult<Option<AuthBinding>> {
        Ok(self.binding(scheme, username))
    }

    async fn create_account(&self, account: &Account) -> StoreResult<AccountId> {
        match self.accounts.entry(account.id) {
            Entry::Occupied(_) => Err(StoreError::conflict(format!(
                "account {} already exists",
                account.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(account.clone());
                Ok(account.id)
            }
        }
    }

    async fn delete_account(&self, id: AccountId) -> StoreResult<()> {
        self.accounts.remove(&id);
        self.credentials.remove(&id);

        // Cascade to the account's bindings in every scheme.
        self.bindings.retain(|_, binding| binding.account_id != id);
        self.owners.retain(|(_, owner), _| *owner != id);
        Ok(())
    }

    async fn create_binding(&self, binding: &AuthBinding) -> StoreResult<()> {
        if !self.accounts.contains_key(&binding.account_id) {
            return Err(StoreError::not_found(format!(
                "account {}",
                binding.account_id
            )));
        }

        // Reserve the per-account slot first, then the binding key.
        let owner_key = (binding.scheme.clone(), binding.account_id);
        match self.owners.entry(owner_key.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::conflict(format!(
                    "account {} already has a {} binding",
                    binding.account_id, binding.scheme
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(binding.username.clone());
            }
        }

        match self
            .bindings
            .entry((binding.scheme.clone(), binding.username.clone()))
        {
            Entry::Occupied(_) => {
                self.owners.remove(&owner_key);
                Err(StoreError::conflict(format!(
                    "binding {} already exists",
                    binding.tag()
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(binding.clone());
                Ok(())
            }
        }
    }

    async fn update_binding(&self, binding: &AuthBinding) -> StoreResult<()> {
        let key = (binding.scheme.clone(), binding.username.clone());
        let mut stored = self
            .bindings
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found(format!("binding {}", binding.tag())))?;

        stored.secret_hash = binding.secret_hash.clone();
        stored.expires_at = binding.expires_at;
        Ok(())
    }

    async fn delete_bindings(&self, scheme: &str, account: AccountId) -> StoreResult<u64> {
        let Some((_, username)) = self.owners.remove(&(scheme.to_string(), account)) else {
            return Ok(0);
        };

        let removed = self
            .bindings
            .remove_if(&(scheme.to_string(), username), |_, b| b.account_id == account)
            .is_some();

        if removed {
            tracing::debug!(scheme, account = %account, "Deleted binding");
        }
        Ok(u64::from(removed))
    }

    async fn upsert_credential(&self, credential: &Credential) -> StoreResult<()> {
        if !self.accounts.contains_key(&credential.account_id) {
            return Err(StoreError::not_found(format!(
                "account {}",
                credential.account_id
            )));
        }

        let mut list = self.credentials.entry(credential.account_id).or_default();
        match list
            .iter_mut()
            .find(|c| c.method == credential.method && c.value == credential.value)
        {
            Some(existing) => existing.done = credential.done,
            None => list.push(credential.clone()),
        }
        Ok(())
    }
}
