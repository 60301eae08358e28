//! Session records produced by authentication schemes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::account::{AccountId, AccountState};
use super::binding::AuthLevel;

/// Features attached to an authenticated session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFeatures {
    /// The credential was validated by an external party.
    pub validated: bool,
}

impl SessionFeatures {
    /// Features of a session validated by an identity provider.
    pub const VALIDATED: Self = Self { validated: true };
}

/// Result of a successful authentication, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Authenticated account.
    pub account_id: AccountId,

    /// Auth level of the session.
    pub auth_level: AuthLevel,

    /// Remaining lifetime of the presented credential.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,

    /// Session features.
    pub features: SessionFeatures,

    /// State of the account.
    pub state: AccountState,
}
