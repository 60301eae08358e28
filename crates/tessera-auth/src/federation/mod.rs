//! External identity provider federation.
//!
//! - [`FederatedAuthenticator`] - the authentication scheme itself
//! - [`IdentityVerifier`] / [`JwksVerifier`] - bearer token verification
//! - [`ExternalClaims`] - typed output of a verification
//! - [`provisioning`] - account records built on a first sign-in

pub mod authenticator;
pub mod claims;
pub mod error;
pub mod jwks;
pub mod provisioning;
pub mod verifier;

pub use authenticator::{DEFAULT_NAME, EXPIRY_MARGIN, FederatedAuthenticator};
pub use claims::{DEFAULT_SUB_PROVIDER, ExternalClaims};
pub use error::{JwksError, VerificationError};
pub use jwks::JwksCache;
pub use provisioning::{EMAIL_METHOD, FederationPath};
pub use verifier::{IdentityVerifier, JwksVerifier};
