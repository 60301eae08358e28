//! Authentication error types.
//!
//! Every error returned by an authentication scheme falls into one of three
//! [`ErrorCategory`] buckets so callers can tell a bad credential (the client
//! must re-authenticate) from an unavailable dependency (the client may retry
//! later) from a misconfiguration (an operator must intervene).

use std::fmt;

use crate::config::ConfigError;
use crate::storage::StoreError;

/// Errors that can occur while authenticating.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// An operation was invoked before the scheme was initialized.
    #[error("Authentication scheme is not initialized")]
    NotInitialized,

    /// The scheme configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// The bearer token was rejected by the identity provider.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The token is expired or expires within the safety margin.
    #[error("Token expired")]
    Expired,

    /// The verified claims do not carry a usable identity.
    #[error("Malformed identity: {message}")]
    MalformedIdentity {
        /// Description of what is missing.
        message: String,
    },

    /// The account store failed.
    #[error("Storage error: {message}")]
    Store {
        /// Description of the storage error.
        message: String,
    },

    /// An outbound call did not complete in time.
    #[error("Timed out waiting for {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// No scheme is registered under the requested name.
    #[error("Unknown authentication scheme: {name}")]
    UnknownScheme {
        /// The requested scheme name.
        name: String,
    },

    /// A scheme with the same name is already registered.
    #[error("Authentication scheme already registered: {name}")]
    DuplicateScheme {
        /// The duplicated scheme name.
        name: String,
    },
}

impl AuthError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `MalformedIdentity` error.
    #[must_use]
    pub fn malformed_identity(message: impl Into<String>) -> Self {
        Self::MalformedIdentity {
            message: message.into(),
        }
    }

    /// Creates a new `Store` error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(operation: &'static str) -> Self {
        Self::Timeout { operation }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a new `UnknownScheme` error.
    #[must_use]
    pub fn unknown_scheme(name: impl Into<String>) -> Self {
        Self::UnknownScheme { name: name.into() }
    }

    /// Creates a new `DuplicateScheme` error.
    #[must_use]
    pub fn duplicate_scheme(name: impl Into<String>) -> Self {
        Self::DuplicateScheme { name: name.into() }
    }

    /// Returns `true` if the caller must obtain a fresh credential.
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. } | Self::Expired | Self::MalformedIdentity { .. }
        )
    }

    /// Returns `true` if the same request may succeed when retried later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store { .. } | Self::Timeout { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if an operator has to fix the deployment.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::Fatal)
    }

    /// Returns the error category for logging and for the session layer.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidToken { .. } => ErrorCategory::Credential,
            Self::Expired => ErrorCategory::Credential,
            Self::MalformedIdentity { .. } => ErrorCategory::Credential,
            Self::UnknownScheme { .. } => ErrorCategory::Credential,
            Self::Store { .. } => ErrorCategory::Unavailable,
            Self::Timeout { .. } => ErrorCategory::Unavailable,
            Self::Internal { .. } => ErrorCategory::Unavailable,
            Self::NotInitialized => ErrorCategory::Fatal,
            Self::Configuration { .. } => ErrorCategory::Fatal,
            Self::DuplicateScheme { .. } => ErrorCategory::Fatal,
        }
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::store(err.to_string())
    }
}

/// What a caller should do about a failed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The credential is bad; re-authenticate with a fresh one.
    Credential,
    /// A dependency is unavailable; retry later.
    Unavailable,
    /// The deployment is misconfigured; an operator must intervene.
    Fatal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential => write!(f, "credential"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}
