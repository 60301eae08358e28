//! Account store trait.
//!
//! The store is the single source of truth for binding uniqueness: creating
//! a binding whose `(scheme, username)` key already exists must fail with
//! [`StoreError::Conflict`], distinct from every other failure.

use async_trait::async_trait;

use crate::types::{Account, AccountId, AuthBinding, Credential};

/// Errors reported by account stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with the same unique key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The record to update does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend failed.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns `true` if this is a uniqueness conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for accounts, auth bindings and contact credentials.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Finds the binding for `(scheme, username)`.
    ///
    /// Absence is `Ok(None)`, not an error.
    async fn find_binding(&self, scheme: &str, username: &str)
    -> StoreResult<Option<AuthBinding>>;

    /// Persists a new account and returns its id.
    async fn create_account(&self, account: &Account) -> StoreResult<AccountId>;

    /// Removes an account. Used to roll back a failed provisioning.
    async fn delete_account(&self, id: AccountId) -> StoreResult<()>;

    /// Creates a binding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if `(scheme, username)` is taken.
    async fn create_binding(&self, binding: &AuthBinding) -> StoreResult<()>;

    /// Updates the secret hash and expiry of the binding keyed on
    /// `(binding.scheme, binding.username)`. Owner and auth level are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the binding does not exist.
    async fn update_binding(&self, binding: &AuthBinding) -> StoreResult<()>;

    /// Deletes every binding of `scheme` owned by `account`. Returns the
    /// number of deleted bindings; zero is not an error.
    async fn delete_bindings(&self, scheme: &str, account: AccountId) -> StoreResult<u64>;

    /// Inserts or replaces a contact credential.
    async fn upsert_credential(&self, credential: &Credential) -> StoreResult<()>;

    /// Creates an account together with its binding and optional credential,
    /// all or nothing.
    ///
    /// The default implementation runs the individual operations in order and
    /// deletes the account again if a later step fails. Backends with
    /// transactions should override it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the binding key is taken; in that
    /// case no account is left behind.
    async fn provision(
        &self,
        account: &Account,
        binding: &AuthBinding,
        credential: Option<&Credential>,
    ) -> StoreResult<()> {
        let account_id = self.create_account(account).await?;

        if let Err(err) = self.create_binding(binding).await {
            rollback_account(self, account_id).await;
            return Err(err);
        }

        if let Some(credential) = credential
            && let Err(err) = self.upsert_credential(credential).await
        {
            if let Err(cleanup) = self.delete_bindings(&binding.scheme, account_id).await {
                tracing::error!(
                    account = %account_id,
                    error = %cleanup,
                    "Failed to remove binding after credential failure"
                );
            }
            rollback_account(self, account_id).await;
            return Err(err);
        }

        Ok(())
    }
}

async fn rollback_account<S: AccountStore + ?Sized>(store: &S, account_id: AccountId) {
    if let Err(err) = store.delete_account(account_id).await {
        tracing::error!(
            account = %account_id,
            error = %err,
            "Failed to roll back account after provisioning failure"
        );
    }
}
