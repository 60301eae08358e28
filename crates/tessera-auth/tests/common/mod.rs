//! Shared helpers for tessera-auth integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tessera_auth::federation::{DEFAULT_NAME, ExternalClaims};
use tessera_auth::{
    Account, AccountId, AccountStore, AuthBinding, AuthLevel, Credential, FederatedAuthenticator,
    FederationConfig, IdentityVerifier, StoreError, StoreResult, VerificationError,
};
use tessera_auth_memory::InMemoryAccountStore;
use time::OffsetDateTime;

/// Verifier returning preconfigured claims per token.
#[derive(Default)]
pub struct StaticVerifier {
    tokens: Mutex<HashMap<String, ExternalClaims>>,
    delay: Option<Duration>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifier that sleeps before answering.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn with_token(self, token: &str, claims: ExternalClaims) -> Self {
        self.issue(token, claims);
        self
    }

    pub fn issue(&self, token: &str, claims: ExternalClaims) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), claims);
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify_token(&self, token: &str) -> Result<ExternalClaims, VerificationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| VerificationError::Rejected("unknown token".to_string()))
    }
}

/// In-memory store with injectable faults.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryAccountStore,
    /// Next `create_binding` first lets a competing sign-in win the key.
    pub lose_next_race: AtomicBool,
    /// Next `create_binding` reports a conflict without writing anything.
    pub phantom_conflict: AtomicBool,
    pub fail_credentials: AtomicBool,
    pub conflict_on_update: AtomicBool,
    pub find_delay: Mutex<Option<Duration>>,
    /// Delay before every `create_binding`.
    pub binding_delay: Mutex<Option<Duration>>,
    /// `create_binding` fails with a backend error after its delay.
    pub fail_bindings: AtomicBool,
    pub race_winner: Mutex<Option<AccountId>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn winner(&self) -> Option<AccountId> {
        *self.race_winner.lock().unwrap()
    }
}

#[async_trait]
impl AccountStore for FaultyStore {
    async fn find_binding(&self, scheme: &str, username: &str) -> StoreResult<Option<AuthBinding>> {
        let delay = *self.find_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.find_binding(scheme, username).await
    }

    async fn create_account(&self, account: &Account) -> StoreResult<AccountId> {
        self.inner.create_account(account).await
    }

    async fn delete_account(&self, id: AccountId) -> StoreResult<()> {
        self.inner.delete_account(id).await
    }

    async fn create_binding(&self, binding: &AuthBinding) -> StoreResult<()> {
        let delay = *self.binding_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_bindings.load(Ordering::SeqCst) {
            return Err(StoreError::backend("binding table unavailable"));
        }

        if self.phantom_conflict.swap(false, Ordering::SeqCst) {
            return Err(StoreError::conflict("phantom"));
        }

        if self.lose_next_race.swap(false, Ordering::SeqCst) {
            let competitor = Account::new(AccountId::new());
            self.inner.create_account(&competitor).await?;
            self.inner
                .create_binding(&AuthBinding {
                    account_id: competitor.id,
                    auth_level: AuthLevel::Root,
                    ..binding.clone()
                })
                .await?;
            *self.race_winner.lock().unwrap() = Some(competitor.id);
        }

        self.inner.create_binding(binding).await
    }

    async fn update_binding(&self, binding: &AuthBinding) -> StoreResult<()> {
        if self.conflict_on_update.load(Ordering::SeqCst) {
            return Err(StoreError::conflict("update raced"));
        }
        self.inner.update_binding(binding).await
    }

    async fn delete_bindings(&self, scheme: &str, account: AccountId) -> StoreResult<u64> {
        self.inner.delete_bindings(scheme, account).await
    }

    async fn upsert_credential(&self, credential: &Credential) -> StoreResult<()> {
        if self.fail_credentials.load(Ordering::SeqCst) {
            return Err(StoreError::backend("credential table unavailable"));
        }
        self.inner.upsert_credential(credential).await
    }
}

/// Claims for `a@x.com` expiring `expires_in` from now.
pub fn alice(expires_in: time::Duration) -> ExternalClaims {
    ExternalClaims::new("uid-alice", OffsetDateTime::now_utc() + expires_in)
        .with_email("a@x.com")
        .with_display_name("Alice")
        .with_picture("https://cdn.example.com/alice.png")
        .with_email_verified(true)
        .with_sub_provider("google.com")
}

pub fn authenticator(
    store: Arc<dyn AccountStore>,
    verifier: Arc<dyn IdentityVerifier>,
) -> FederatedAuthenticator {
    authenticator_with(store, verifier, FederationConfig::default())
}

pub fn authenticator_with(
    store: Arc<dyn AccountStore>,
    verifier: Arc<dyn IdentityVerifier>,
    config: FederationConfig,
) -> FederatedAuthenticator {
    FederatedAuthenticator::with_verifier(DEFAULT_NAME, store, verifier, config)
        .expect("valid test configuration")
}

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
