//! Internal accounts and contact credentials.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Identifier of an internal account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Generates a fresh random account id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    /// The account can authenticate.
    #[default]
    Active,
    /// The account is temporarily blocked.
    Suspended,
    /// The account was deleted.
    Deleted,
}

impl AccountState {
    /// Returns the storage representation of the state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown account state: {other}")),
        }
    }
}

/// Publicly visible profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    /// Display name.
    #[serde(rename = "fn", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Reference to the avatar image.
    #[serde(rename = "photo", skip_serializing_if = "Option::is_none")]
    pub photo_ref: Option<String>,
}

/// Attributes vouched for by a trusted party.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustFlags {
    /// The identity provider verified the email address.
    pub email_verified: bool,
}

/// An internal user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: AccountId,

    /// Lifecycle state.
    pub state: AccountState,

    /// Public profile.
    pub public: PublicProfile,

    /// Trusted flags.
    pub trusted: TrustFlags,

    /// Discovery tags such as `email:alice@example.com`.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Private fields visible only to the account owner and operators.
    #[serde(default)]
    pub private: Vec<String>,

    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Account {
    /// Creates an active account with an empty profile.
    #[must_use]
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            state: AccountState::Active,
            public: PublicProfile::default(),
            trusted: TrustFlags::default(),
            tags: Vec::new(),
            private: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Returns `true` if the account carries the given tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A contact method to verify, e.g. an email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Owning account.
    pub account_id: AccountId,

    /// Contact method name, e.g. `email`.
    pub method: String,

    /// Contact value, e.g. the address.
    pub value: String,

    /// The value is already verified.
    pub done: bool,
}

impl Credential {
    /// Creates a credential that is already verified.
    #[must_use]
    pub fn verified(
        account_id: AccountId,
        method: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            method: method.into(),
            value: value.into(),
            done: true,
        }
    }
}
