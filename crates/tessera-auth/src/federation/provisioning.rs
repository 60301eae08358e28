//! Account provisioning for federated sign-ins.
//!
//! Pure helpers that turn verified [`ExternalClaims`] into the records the
//! authenticator persists on a first sign-in: the federation username, the
//! new [`Account`] and the pre-verified email [`Credential`].

use std::fmt;

use super::claims::ExternalClaims;
use crate::error::AuthError;
use crate::types::{Account, AccountId, Credential};

/// Credential method recorded for the email contact.
pub const EMAIL_METHOD: &str = "email";

/// Which branch a federated sign-in took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FederationPath {
    /// A new account and binding were created.
    Provisioned,
    /// An existing binding was refreshed.
    Refreshed,
    /// Provisioning lost a race and the winner's binding was refreshed.
    RecoveredConflict,
}

impl FederationPath {
    /// Returns `true` if this sign-in created the account.
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        matches!(self, Self::Provisioned)
    }
}

impl fmt::Display for FederationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisioned => write!(f, "provisioned"),
            Self::Refreshed => write!(f, "refreshed"),
            Self::RecoveredConflict => write!(f, "recovered_conflict"),
        }
    }
}

/// Derives the federation username from the claims.
///
/// The email wins. Without one the display name is used if
/// `allow_display_name_fallback` is set.
///
/// # Errors
///
/// Returns `AuthError::MalformedIdentity` if no usable value is present.
pub fn federation_username(
    claims: &ExternalClaims,
    allow_display_name_fallback: bool,
) -> Result<String, AuthError> {
    if let Some(email) = non_empty(claims.email.as_deref()) {
        return Ok(email.to_string());
    }

    if allow_display_name_fallback
        && let Some(name) = non_empty(claims.display_name.as_deref())
    {
        return Ok(name.to_string());
    }

    Err(AuthError::malformed_identity(if allow_display_name_fallback {
        "token carries neither email nor display name"
    } else {
        "token carries no email"
    }))
}

/// Discovery tags of a newly federated account.
#[must_use]
pub fn account_tags(scheme: &str, username: &str, claims: &ExternalClaims) -> Vec<String> {
    let mut tags = vec![format!("{scheme}:{username}")];
    if let Some(email) = non_empty(claims.email.as_deref()) {
        tags.push(format!("email:{email}"));
    }
    tags.push(format!("{}:{}", claims.sub_provider, claims.subject));
    tags
}

/// Builds the account created on a first sign-in.
#[must_use]
pub fn new_account(
    id: AccountId,
    scheme: &str,
    username: &str,
    claims: &ExternalClaims,
) -> Account {
    let mut account = Account::new(id);
    account.public.display_name = claims.display_name.clone();
    account.public.photo_ref = claims.picture.clone();
    account.trusted.email_verified = claims.email_verified;
    account.tags = account_tags(scheme, username, claims);
    account.private = vec![format!("uid:{}", claims.subject)];
    account
}

/// The email credential recorded at provisioning, if the token has an email.
#[must_use]
pub fn verified_email_credential(id: AccountId, claims: &ExternalClaims) -> Option<Credential> {
    non_empty(claims.email.as_deref()).map(|email| Credential::verified(id, EMAIL_METHOD, email))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
