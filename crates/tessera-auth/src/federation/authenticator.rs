//! Federated authentication scheme.
//!
//! [`FederatedAuthenticator`] accepts a bearer token issued by an external
//! identity provider, verifies it, and resolves it to an internal account:
//!
//! 1. Verify the token with the [`IdentityVerifier`]. Any failure is
//!    `InvalidToken`.
//! 2. Reject tokens expiring within [`EXPIRY_MARGIN`] as `Expired`.
//! 3. Derive the federation username (email, else display name).
//! 4. Look up the binding for `(scheme, username)`.
//! 5. No binding: provision the account, binding and email credential in one
//!    all-or-nothing store call. The call runs as its own task, so a timeout
//!    stops the wait but never interrupts the store's rollback. If the store
//!    reports a conflict another sign-in won the race; refresh its binding
//!    instead, once.
//! 6. Existing binding: refresh its fingerprint and expiry only.
//!
//! The store's uniqueness constraint on `(scheme, username)` is the only
//! synchronization; the authenticator holds no locks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use super::claims::ExternalClaims;
use super::provisioning::{
    FederationPath, federation_username, new_account, verified_email_credential,
};
use super::verifier::{IdentityVerifier, JwksVerifier};
use crate::config::FederationConfig;
use crate::fingerprint::hash_subject_blocking;
use crate::scheme::{AuthHandler, AuthOutcome, GeneratedSecret};
use crate::storage::{AccountStore, StoreError};
use crate::types::{AccountId, AccountState, AuthBinding, SessionFeatures, SessionRecord};
use crate::{AuthError, AuthResult};

/// Name the scheme reports before it is initialized.
pub const DEFAULT_NAME: &str = "oauth2";

/// Tokens must stay valid at least this long past the current time.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(1);

const IDENTITY_PROVIDER: &str = "identity provider";
const ACCOUNT_STORE: &str = "account store";

struct Initialized {
    name: String,
    verifier: Arc<dyn IdentityVerifier>,
    config: FederationConfig,
}

/// Authentication scheme backed by an external identity provider.
pub struct FederatedAuthenticator {
    store: Arc<dyn AccountStore>,
    state: OnceLock<Initialized>,
}

impl std::fmt::Debug for FederatedAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedAuthenticator")
            .field("name", &self.name())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl FederatedAuthenticator {
    /// Creates an uninitialized authenticator over `store`.
    ///
    /// Call [`AuthHandler::init`] before use.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self {
            store,
            state: OnceLock::new(),
        }
    }

    /// Creates an authenticator that is already initialized with `verifier`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if `config` or `name` is invalid.
    pub fn with_verifier(
        name: &str,
        store: Arc<dyn AccountStore>,
        verifier: Arc<dyn IdentityVerifier>,
        config: FederationConfig,
    ) -> AuthResult<Self> {
        let authenticator = Self::new(store);
        authenticator.init_with_verifier(name, verifier, config)?;
        Ok(authenticator)
    }

    /// Initializes the authenticator with an explicit verifier.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if `config` or `name` is invalid,
    /// or if the authenticator is already initialized.
    pub fn init_with_verifier(
        &self,
        name: &str,
        verifier: Arc<dyn IdentityVerifier>,
        config: FederationConfig,
    ) -> AuthResult<()> {
        if self.state.get().is_some() {
            return Err(AuthError::configuration("already initialized"));
        }

        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(AuthError::configuration("scheme name cannot be empty"));
        }
        config.validate()?;

        self.state
            .set(Initialized {
                name,
                verifier,
                config,
            })
            .map_err(|_| AuthError::configuration("already initialized"))
    }

    /// Active configuration, once initialized.
    #[must_use]
    pub fn config(&self) -> Option<&FederationConfig> {
        self.state.get().map(|s| &s.config)
    }

    fn state(&self) -> AuthResult<&Initialized> {
        self.state.get().ok_or(AuthError::NotInitialized)
    }

    /// Authenticates a bearer token and reports which branch was taken.
    ///
    /// # Errors
    ///
    /// See the module documentation for the failure of each step.
    #[tracing::instrument(
        name = "federated_authenticate",
        skip(self, token),
        fields(scheme = %self.name(), path = tracing::field::Empty)
    )]
    pub async fn federate(
        &self,
        token: &str,
        remote_addr: &str,
    ) -> AuthResult<(SessionRecord, FederationPath)> {
        let state = self.state()?;
        let config = &state.config;

        let claims = within(
            config.verify_timeout,
            IDENTITY_PROVIDER,
            state.verifier.verify_token(token),
        )
        .await?
        .map_err(|e| {
            tracing::warn!(error = %e, "Identity provider rejected token");
            AuthError::invalid_token(e.to_string())
        })?;

        let now = OffsetDateTime::now_utc();
        if claims.expires_at <= now + EXPIRY_MARGIN {
            tracing::debug!(expires_at = %claims.expires_at, "Token expired");
            return Err(AuthError::Expired);
        }

        let username = federation_username(&claims, config.allow_display_name_fallback)?;

        let secret_hash = hash_subject_blocking(claims.subject.clone())
            .await
            .map_err(|e| AuthError::internal(e.to_string()))?;

        let existing = within(
            config.store_timeout,
            ACCOUNT_STORE,
            self.store.find_binding(&state.name, &username),
        )
        .await??;

        let (binding, path) = match existing {
            Some(binding) => (
                self.refresh(state, binding, secret_hash, claims.expires_at)
                    .await?,
                FederationPath::Refreshed,
            ),
            None => {
                self.provision(state, &username, &claims, secret_hash)
                    .await?
            }
        };

        tracing::Span::current().record("path", tracing::field::display(path));
        if path.is_provisioned() {
            tracing::info!(account = %binding.account_id, "Provisioned federated account");
        } else {
            tracing::debug!(account = %binding.account_id, "Refreshed federated binding");
        }

        let lifetime = Duration::try_from(claims.expires_at - now).unwrap_or_default();

        Ok((
            SessionRecord {
                account_id: binding.account_id,
                auth_level: binding.auth_level,
                lifetime,
                features: SessionFeatures::VALIDATED,
                state: AccountState::Active,
            },
            path,
        ))
    }

    async fn provision(
        &self,
        state: &Initialized,
        username: &str,
        claims: &ExternalClaims,
        secret_hash: String,
    ) -> AuthResult<(AuthBinding, FederationPath)> {
        let account_id = AccountId::new();
        let account = new_account(account_id, &state.name, username, claims);
        let credential = verified_email_credential(account_id, claims);
        let binding = AuthBinding {
            scheme: state.name.clone(),
            username: username.to_string(),
            account_id,
            auth_level: state.config.default_auth_level,
            secret_hash,
            expires_at: claims.expires_at,
        };

        // Detached so a timeout cannot cut the store's rollback short.
        let task = {
            let store = Arc::clone(&self.store);
            let binding = binding.clone();
            tokio::spawn(async move {
                store
                    .provision(&account, &binding, credential.as_ref())
                    .await
            })
        };

        let result = within(state.config.store_timeout, ACCOUNT_STORE, task)
            .await?
            .map_err(|e| AuthError::internal(format!("provisioning task failed: {e}")))?;

        match result {
            Ok(()) => Ok((binding, FederationPath::Provisioned)),
            Err(StoreError::Conflict(_)) => {
                tracing::debug!("Binding created concurrently, refreshing it instead");
                let winner = within(
                    state.config.store_timeout,
                    ACCOUNT_STORE,
                    self.store.find_binding(&state.name, username),
                )
                .await??
                .ok_or_else(|| AuthError::store("binding disappeared after a create conflict"))?;

                let refreshed = self
                    .refresh(state, winner, binding.secret_hash, binding.expires_at)
                    .await?;
                Ok((refreshed, FederationPath::RecoveredConflict))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn refresh(
        &self,
        state: &Initialized,
        mut binding: AuthBinding,
        secret_hash: String,
        expires_at: OffsetDateTime,
    ) -> AuthResult<AuthBinding> {
        binding.secret_hash = secret_hash;
        binding.expires_at = expires_at;

        within(
            state.config.store_timeout,
            ACCOUNT_STORE,
            self.store.update_binding(&binding),
        )
        .await??;

        Ok(binding)
    }
}

/// Bounds `fut` by `limit`, failing with `AuthError::Timeout`.
async fn within<F: Future>(
    limit: Duration,
    operation: &'static str,
    fut: F,
) -> AuthResult<F::Output> {
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        tracing::warn!(operation, timeout = ?limit, "Operation timed out");
        AuthError::timeout(operation)
    })
}

#[async_trait]
impl AuthHandler for FederatedAuthenticator {
    async fn init(&self, config: &[u8], name: &str) -> AuthResult<()> {
        if self.state.get().is_some() {
            return Err(AuthError::configuration("already initialized"));
        }

        let config = FederationConfig::from_json(config)?;
        config.validate()?;
        let verifier = JwksVerifier::from_config(&config.verifier).await?;

        self.init_with_verifier(name, Arc::new(verifier), config)
    }

    fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    fn name(&self) -> &str {
        self.state
            .get()
            .map_or(DEFAULT_NAME, |state| state.name.as_str())
    }

    async fn authenticate(&self, secret: &[u8], remote_addr: &str) -> AuthResult<AuthOutcome> {
        self.state()?;
        let token = std::str::from_utf8(secret)
            .map_err(|_| AuthError::invalid_token("token is not valid UTF-8"))?;

        let (record, _) = self.federate(token, remote_addr).await?;
        Ok(AuthOutcome::complete(record))
    }

    async fn is_unique(&self, _secret: &[u8], _remote_addr: &str) -> AuthResult<bool> {
        // Uniqueness is enforced by the store when the binding is created.
        self.state()?;
        Ok(true)
    }

    async fn gen_secret(&self, _record: &SessionRecord) -> AuthResult<GeneratedSecret> {
        self.state()?;
        Ok(GeneratedSecret::default())
    }

    async fn add_record(
        &self,
        record: &SessionRecord,
        _secret: &[u8],
        _remote_addr: &str,
    ) -> AuthResult<SessionRecord> {
        self.state()?;
        Ok(record.clone())
    }

    async fn update_record(
        &self,
        record: &SessionRecord,
        _secret: &[u8],
        _remote_addr: &str,
    ) -> AuthResult<SessionRecord> {
        self.state()?;
        Ok(record.clone())
    }

    fn as_tag(&self, _secret: &str) -> Option<String> {
        None
    }

    fn restricted_tags(&self) -> AuthResult<Vec<String>> {
        self.state()?;
        Ok(Vec::new())
    }

    async fn reset_params(&self, _account: AccountId) -> AuthResult<HashMap<String, String>> {
        self.state()?;
        Ok(HashMap::new())
    }

    #[tracing::instrument(skip(self), fields(scheme = %self.name()))]
    async fn del_records(&self, account: AccountId) -> AuthResult<()> {
        let state = self.state()?;
        let deleted = within(
            state.config.store_timeout,
            ACCOUNT_STORE,
            self.store.delete_bindings(&state.name, account),
        )
        .await??;

        tracing::debug!(deleted, "Deleted federated bindings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::VerificationError;
    use crate::storage::StoreResult;
    use crate::types::{Account, AuthLevel, Credential};
    use std::sync::Mutex;

    /// Returns fixed claims for every token.
    struct FixedVerifier(ExternalClaims);

    #[async_trait]
    impl IdentityVerifier for FixedVerifier {
        async fn verify_token(&self, _token: &str) -> Result<ExternalClaims, VerificationError> {
            Ok(self.0.clone())
        }
    }

    /// Records calls and holds at most one binding.
    #[derive(Default)]
    struct RecordingStore {
        binding: Mutex<Option<AuthBinding>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl RecordingStore {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AccountStore for RecordingStore {
        async fn find_binding(&self, _s: &str, _u: &str) -> StoreResult<Option<AuthBinding>> {
            self.calls.lock().unwrap().push("find_binding");
            Ok(self.binding.lock().unwrap().clone())
        }

        async fn create_account(&self, account: &Account) -> StoreResult<AccountId> {
            self.calls.lock().unwrap().push("create_account");
            Ok(account.id)
        }

        async fn delete_account(&self, _id: AccountId) -> StoreResult<()> {
            self.calls.lock().unwrap().push("delete_account");
            Ok(())
        }

        async fn create_binding(&self, binding: &AuthBinding) -> StoreResult<()> {
            self.calls.lock().unwrap().push("create_binding");
            *self.binding.lock().unwrap() = Some(binding.clone());
            Ok(())
        }

        async fn update_binding(&self, binding: &AuthBinding) -> StoreResult<()> {
            self.calls.lock().unwrap().push("update_binding");
            *self.binding.lock().unwrap() = Some(binding.clone());
            Ok(())
        }

        async fn delete_bindings(&self, _s: &str, _a: AccountId) -> StoreResult<u64> {
            self.calls.lock().unwrap().push("delete_bindings");
            Ok(u64::from(self.binding.lock().unwrap().take().is_some()))
        }

        async fn upsert_credential(&self, _c: &Credential) -> StoreResult<()> {
            self.calls.lock().unwrap().push("upsert_credential");
            Ok(())
        }
    }

    fn claims(expires_in: time::Duration) -> ExternalClaims {
        ExternalClaims::new("uid-1", OffsetDateTime::now_utc() + expires_in).with_email("a@x.com")
    }

    fn authenticator(
        store: Arc<RecordingStore>,
        claims: ExternalClaims,
    ) -> FederatedAuthenticator {
        FederatedAuthenticator::with_verifier(
            DEFAULT_NAME,
            store,
            Arc::new(FixedVerifier(claims)),
            FederationConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let auth = FederatedAuthenticator::new(Arc::new(RecordingStore::default()));
        assert!(!auth.is_initialized());
        assert_eq!(auth.name(), DEFAULT_NAME);

        let err = auth.authenticate(b"token", "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, AuthError::NotInitialized));
        assert!(matches!(
            auth.restricted_tags(),
            Err(AuthError::NotInitialized)
        ));
        assert!(matches!(
            auth.del_records(AccountId::new()).await,
            Err(AuthError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_provision_then_refresh() {
        let store = Arc::new(RecordingStore::default());
        let auth = authenticator(store.clone(), claims(time::Duration::hours(1)));

        let (first, path) = auth.federate("token", "127.0.0.1").await.unwrap();
        assert_eq!(path, FederationPath::Provisioned);
        assert_eq!(first.auth_level, AuthLevel::Auth);
        assert_eq!(first.features, SessionFeatures::VALIDATED);
        assert_eq!(
            store.calls(),
            vec![
                "find_binding",
                "create_account",
                "create_binding",
                "upsert_credential"
            ]
        );

        let (second, path) = auth.federate("token", "127.0.0.1").await.unwrap();
        assert_eq!(path, FederationPath::Refreshed);
        assert_eq!(second.account_id, first.account_id);
        assert_eq!(store.calls().last(), Some(&"update_binding"));
    }

    #[tokio::test]
    async fn test_expiry_margin() {
        let store = Arc::new(RecordingStore::default());
        let auth = authenticator(store.clone(), claims(time::Duration::milliseconds(500)));

        let err = auth.authenticate(b"token", "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, AuthError::Expired));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_secret() {
        let store = Arc::new(RecordingStore::default());
        let auth = authenticator(store, claims(time::Duration::hours(1)));

        let err = auth.authenticate(&[0xff, 0xfe], "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_neutral_operations() {
        let store = Arc::new(RecordingStore::default());
        let auth = authenticator(store, claims(time::Duration::hours(1)));
        let record = SessionRecord {
            account_id: AccountId::new(),
            auth_level: AuthLevel::Auth,
            lifetime: Duration::from_secs(10),
            features: SessionFeatures::VALIDATED,
            state: AccountState::Active,
        };

        assert!(auth.is_unique(b"token", "127.0.0.1").await.unwrap());
        assert!(auth.gen_secret(&record).await.unwrap().is_empty());
        assert_eq!(auth.add_record(&record, b"", "").await.unwrap(), record);
        assert_eq!(auth.update_record(&record, b"", "").await.unwrap(), record);
        assert_eq!(auth.as_tag("a@x.com"), None);
        assert!(auth.restricted_tags().unwrap().is_empty());
        assert!(auth.reset_params(record.account_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_init_is_rejected() {
        let store = Arc::new(RecordingStore::default());
        let auth = authenticator(store, claims(time::Duration::hours(1)));

        let err = auth.init(b"{}", "oauth2").await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
        assert!(err.to_string().contains("already initialized"));
    }

    #[tokio::test]
    async fn test_init_rejects_bad_config() {
        let auth = FederatedAuthenticator::new(Arc::new(RecordingStore::default()));

        let err = auth.init(b"{not json", "oauth2").await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));

        // No project id and no explicit endpoints.
        let err = auth.init(b"{}", "oauth2").await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
        assert!(!auth.is_initialized());
    }

    #[tokio::test]
    async fn test_init_with_project_id() {
        let auth = FederatedAuthenticator::new(Arc::new(RecordingStore::default()));
        auth.init(br#"{"verifier": {"project_id": "chat-123"}}"#, "OAuth2")
            .await
            .unwrap();

        assert!(auth.is_initialized());
        assert_eq!(auth.name(), "oauth2");
        assert_eq!(
            auth.config().unwrap().verifier.project_id.as_deref(),
            Some("chat-123")
        );
    }
}
