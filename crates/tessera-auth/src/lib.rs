//! # tessera-auth
//!
//! Pluggable authentication schemes for the Tessera chat server.
//!
//! This crate provides:
//! - The [`AuthHandler`] capability every authentication scheme implements
//! - An explicit, startup-built [`AuthSchemeRegistry`]
//! - A federated scheme that accepts bearer tokens issued by an external
//!   identity provider, provisions accounts on first use and refreshes the
//!   account binding afterwards
//! - Storage traits for accounts, auth bindings and credentials
//!
//! ## Modules
//!
//! - [`config`] - Federation configuration
//! - [`federation`] - External identity provider federation
//! - [`scheme`] - The authentication scheme capability trait
//! - [`registry`] - Scheme registry passed to the session layer
//! - [`storage`] - Storage traits for account data
//! - [`fingerprint`] - Argon2 fingerprints stored on bindings
//! - [`types`] - Accounts, bindings, credentials and session records

pub mod config;
pub mod error;
pub mod federation;
pub mod fingerprint;
pub mod registry;
pub mod scheme;
pub mod storage;
pub mod types;

pub use config::{ConfigError, FederationConfig, VerifierConfig};
pub use error::{AuthError, ErrorCategory};
pub use federation::{
    ExternalClaims, FederatedAuthenticator, IdentityVerifier, JwksVerifier, VerificationError,
};
pub use registry::{AuthSchemeRegistry, AuthSchemeRegistryBuilder};
pub use scheme::{AuthHandler, AuthOutcome, GeneratedSecret};
pub use storage::{AccountStore, StoreError, StoreResult};
pub use types::{
    Account, AccountId, AccountState, AuthBinding, AuthLevel, Credential, PublicProfile,
    SessionFeatures, SessionRecord, TrustFlags,
};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
