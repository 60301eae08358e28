//! The capability every authentication scheme implements.
//!
//! The session layer selects a scheme by name through the
//! [`AuthSchemeRegistry`](crate::AuthSchemeRegistry) and drives it only
//! through [`AuthHandler`]. Schemes that verify credentials with an external
//! party have nothing to generate or reset locally; they answer the
//! corresponding operations with neutral values.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::{AccountId, SessionRecord};

/// Result of a successful [`AuthHandler::authenticate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// The authenticated session.
    pub record: SessionRecord,

    /// Opaque token the client must present to continue a multi-step
    /// exchange. `None` for single-step schemes.
    pub continuation: Option<Vec<u8>>,
}

impl AuthOutcome {
    /// A completed single-step authentication.
    #[must_use]
    pub fn complete(record: SessionRecord) -> Self {
        Self {
            record,
            continuation: None,
        }
    }
}

/// A secret issued by a scheme, e.g. a resumable session token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedSecret {
    /// The secret bytes; empty when the scheme issues none.
    pub secret: Vec<u8>,

    /// When the secret stops being valid.
    pub expires_at: Option<OffsetDateTime>,
}

impl GeneratedSecret {
    /// Returns `true` if no secret was issued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }
}

/// A pluggable authentication scheme.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    /// Initializes the scheme from its configuration blob. `name` is the
    /// name the scheme is registered under.
    ///
    /// Succeeds at most once.
    async fn init(&self, config: &[u8], name: &str) -> AuthResult<()>;

    /// Returns `true` once [`init`](Self::init) has succeeded.
    fn is_initialized(&self) -> bool;

    /// The scheme name.
    fn name(&self) -> &str;

    /// Authenticates `secret` presented from `remote_addr`.
    async fn authenticate(&self, secret: &[u8], remote_addr: &str) -> AuthResult<AuthOutcome>;

    /// Checks whether `secret` would be unique under this scheme.
    async fn is_unique(&self, secret: &[u8], remote_addr: &str) -> AuthResult<bool>;

    /// Issues a new secret for an authenticated session.
    async fn gen_secret(&self, record: &SessionRecord) -> AuthResult<GeneratedSecret>;

    /// Adds the scheme's record for a new account.
    async fn add_record(
        &self,
        record: &SessionRecord,
        secret: &[u8],
        remote_addr: &str,
    ) -> AuthResult<SessionRecord>;

    /// Replaces the scheme's record of an account.
    async fn update_record(
        &self,
        record: &SessionRecord,
        secret: &[u8],
        remote_addr: &str,
    ) -> AuthResult<SessionRecord>;

    /// Converts a secret into a discovery tag, if the scheme supports it.
    fn as_tag(&self, secret: &str) -> Option<String>;

    /// Tag prefixes users must not set themselves.
    fn restricted_tags(&self) -> AuthResult<Vec<String>>;

    /// Parameters needed to reset the account's secret.
    async fn reset_params(&self, account: AccountId) -> AuthResult<HashMap<String, String>>;

    /// Deletes all of the account's records under this scheme. Idempotent.
    async fn del_records(&self, account: AccountId) -> AuthResult<()>;
}
