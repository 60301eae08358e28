//! Auth bindings: the durable link between an account and a scheme identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::account::AccountId;

/// Authentication level granted to a session.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    /// Not authenticated.
    None,
    /// Anonymous session.
    Anon,
    /// Regular authenticated user.
    #[default]
    Auth,
    /// Operator with elevated rights.
    Root,
}

impl AuthLevel {
    /// Returns the storage representation of the level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Anon => "anon",
            Self::Auth => "auth",
            Self::Root => "root",
        }
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "anon" => Ok(Self::Anon),
            "auth" => Ok(Self::Auth),
            "root" => Ok(Self::Root),
            other => Err(format!("unknown auth level: {other}")),
        }
    }
}

/// Link between an account and an identity under a named scheme.
///
/// Keyed on `(scheme, username)`; the store guarantees that key is unique.
/// Only `secret_hash` and `expires_at` change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBinding {
    /// Scheme name, e.g. `oauth2`.
    pub scheme: String,

    /// Username under the scheme.
    pub username: String,

    /// Owning account.
    pub account_id: AccountId,

    /// Auth level granted to sessions created through this binding.
    pub auth_level: AuthLevel,

    /// Opaque, non-reversible fingerprint of the external identity.
    pub secret_hash: String,

    /// Expiry of the last token presented for this binding.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthBinding {
    /// Returns the `scheme:username` tag for this binding.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}:{}", self.scheme, self.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_level_parse_and_display() {
        assert_eq!("auth".parse::<AuthLevel>(), Ok(AuthLevel::Auth));
        assert_eq!("ROOT".parse::<AuthLevel>(), Ok(AuthLevel::Root));
        assert_eq!("".parse::<AuthLevel>(), Ok(AuthLevel::None));
        assert!("admin".parse::<AuthLevel>().is_err());
        assert_eq!(AuthLevel::Anon.to_string(), "anon");
    }

    #[test]
    fn test_auth_level_ordering() {
        assert!(AuthLevel::Root > AuthLevel::Auth);
        assert!(AuthLevel::Auth > AuthLevel::Anon);
        assert_eq!(AuthLevel::default(), AuthLevel::Auth);
    }

    #[test]
    fn test_binding_tag() {
        let binding = AuthBinding {
            scheme: "oauth2".to_string(),
            username: "a@x.com".to_string(),
            account_id: AccountId::new(),
            auth_level: AuthLevel::Auth,
            secret_hash: String::new(),
            expires_at: OffsetDateTime::now_utc(),
        };
        assert_eq!(binding.tag(), "oauth2:a@x.com");
    }
}
