//! Binding fingerprints.
//!
//! A federated binding stores an Argon2id hash of the external subject id.
//! It is never used to authenticate (every sign-in is re-verified with the
//! identity provider); it only ties the binding to the external account in a
//! way that can be audited without revealing the subject id.
//!
//! # Example
//!
//! ```
//! use tessera_auth::fingerprint::{hash_subject, verify_fingerprint};
//!
//! let hash = hash_subject("firebase-uid-123").unwrap();
//! assert!(hash.starts_with("$argon2id$"));
//! assert!(verify_fingerprint("firebase-uid-123", &hash).unwrap());
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Hashes an external subject id with Argon2id and a random salt.
///
/// Returns a PHC-formatted string.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_subject(subject: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(subject.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Checks whether `hash` is the fingerprint of `subject`.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if `hash` is not a valid PHC string.
pub fn verify_fingerprint(subject: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(subject.as_bytes(), &parsed)
        .is_ok())
}

/// Errors from computing a fingerprint off the async runtime.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// Argon2 rejected the input or parameters.
    #[error("fingerprint hashing failed: {0}")]
    Hash(argon2::password_hash::Error),

    /// The blocking task panicked or was cancelled.
    #[error("fingerprint task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Hashes `subject` on the blocking thread pool.
pub(crate) async fn hash_subject_blocking(subject: String) -> Result<String, FingerprintError> {
    tokio::task::spawn_blocking(move || hash_subject(&subject))
        .await?
        .map_err(FingerprintError::Hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_salted() {
        let first = hash_subject("uid-1").unwrap();
        let second = hash_subject("uid-1").unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("$argon2id$"));
    }

    #[test]
    fn test_hash_does_not_contain_subject() {
        let hash = hash_subject("very-recognizable-subject").unwrap();
        assert!(!hash.contains("very-recognizable-subject"));
    }

    #[test]
    fn test_verify_fingerprint() {
        let hash = hash_subject("uid-1").unwrap();
        assert!(verify_fingerprint("uid-1", &hash).unwrap());
        assert!(!verify_fingerprint("uid-2", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(verify_fingerprint("uid-1", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_fingerprint_error_display() {
        let err = FingerprintError::Hash(argon2::password_hash::Error::Password);
        assert!(err.to_string().starts_with("fingerprint hashing failed: "));
    }

    #[tokio::test]
    async fn test_hash_subject_blocking() {
        let hash = hash_subject_blocking("uid-1".to_string()).await.unwrap();
        assert!(verify_fingerprint("uid-1", &hash).unwrap());
    }
}
