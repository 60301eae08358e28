//! Error types for identity provider verification.
//!
//! The authenticator surfaces every [`VerificationError`] as
//! [`AuthError::InvalidToken`](crate::AuthError::InvalidToken); the finer
//! variants exist for logging and for callers using a verifier directly.

/// Errors that can occur during JWKS operations.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// A network error occurred while fetching the JWKS.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The JWKS response could not be parsed as JSON.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// The requested key was not found in the JWKS.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The key could not be converted to a decoding key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The JWKS URI scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

/// Errors that can occur while verifying a bearer token.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// Failed to fetch or use the provider's signing keys.
    #[error("JWKS error: {0}")]
    Jwks(#[from] JwksError),

    /// The token is missing the required `kid` header.
    #[error("Token is missing key ID (kid) header")]
    MissingKeyId,

    /// JWT decoding or validation error (signature, issuer, audience).
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// A required claim is absent.
    #[error("Missing claim: {0}")]
    MissingClaim(&'static str),

    /// A claim has an unusable value.
    #[error("Invalid claim {claim}: {message}")]
    InvalidClaim {
        /// The offending claim.
        claim: &'static str,
        /// Why it was rejected.
        message: String,
    },

    /// The provider rejected the token for another reason.
    #[error("Rejected by identity provider: {0}")]
    Rejected(String),
}

impl VerificationError {
    /// Creates an `InvalidClaim` error.
    #[must_use]
    pub fn invalid_claim(claim: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidClaim {
            claim,
            message: message.into(),
        }
    }

    /// Returns `true` if the identity provider could not be reached.
    #[must_use]
    pub fn is_external_error(&self) -> bool {
        matches!(
            self,
            Self::Jwks(JwksError::NetworkError(_) | JwksError::HttpError(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VerificationError::MissingKeyId;
        assert_eq!(err.to_string(), "Token is missing key ID (kid) header");

        let err = VerificationError::MissingClaim("sub");
        assert_eq!(err.to_string(), "Missing claim: sub");

        let err = VerificationError::invalid_claim("exp", "out of range");
        assert_eq!(err.to_string(), "Invalid claim exp: out of range");

        let err = JwksError::ResponseTooLarge { max_size: 1024 };
        assert_eq!(
            err.to_string(),
            "Response exceeds maximum size of 1024 bytes"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(VerificationError::from(JwksError::HttpError(503)).is_external_error());
        assert!(
            VerificationError::from(JwksError::NetworkError("refused".to_string()))
                .is_external_error()
        );
        assert!(!VerificationError::from(JwksError::KeyNotFound("k".to_string())).is_external_error());
        assert!(!VerificationError::MissingKeyId.is_external_error());
    }
}
