//! Verified identity claims.
//!
//! [`ExternalClaims`] is the only shape in which identity provider output
//! travels past the verifier. Raw token payloads are decoded into
//! [`IdTokenClaims`] and converted field by field, so no untyped claim map
//! leaks into the authenticator.

use serde::Deserialize;
use time::OffsetDateTime;

use super::error::VerificationError;

/// Sub-provider reported when a token does not name one.
pub const DEFAULT_SUB_PROVIDER: &str = "external";

/// Claims of a verified external identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalClaims {
    /// Stable subject id of the external account.
    pub subject: String,

    /// Email address.
    pub email: Option<String>,

    /// Display name.
    pub display_name: Option<String>,

    /// Avatar reference.
    pub picture: Option<String>,

    /// The provider verified the email address.
    pub email_verified: bool,

    /// Sign-in method used at the provider, e.g. `google.com` or `password`.
    pub sub_provider: String,

    /// Absolute expiry of the token.
    pub expires_at: OffsetDateTime,
}

impl ExternalClaims {
    /// Creates claims for `subject` expiring at `expires_at`.
    #[must_use]
    pub fn new(subject: impl Into<String>, expires_at: OffsetDateTime) -> Self {
        Self {
            subject: subject.into(),
            email: None,
            display_name: None,
            picture: None,
            email_verified: false,
            sub_provider: DEFAULT_SUB_PROVIDER.to_string(),
            expires_at,
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the avatar reference.
    #[must_use]
    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }

    /// Sets the email-verified flag.
    #[must_use]
    pub fn with_email_verified(mut self, verified: bool) -> Self {
        self.email_verified = verified;
        self
    }

    /// Sets the sub-provider.
    #[must_use]
    pub fn with_sub_provider(mut self, provider: impl Into<String>) -> Self {
        self.sub_provider = provider.into();
        self
    }
}

/// Raw ID token payload as issued by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    /// Subject.
    #[serde(default)]
    pub sub: String,

    /// Expiry as a Unix timestamp.
    pub exp: i64,

    /// Issue time as a Unix timestamp.
    #[serde(default)]
    pub iat: Option<i64>,

    /// Email address.
    #[serde(default)]
    pub email: Option<String>,

    /// Email verification flag.
    #[serde(default)]
    pub email_verified: Option<bool>,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// Avatar URL.
    #[serde(default)]
    pub picture: Option<String>,

    /// Provider-specific section naming the sign-in method.
    #[serde(default)]
    pub firebase: Option<ProviderSection>,
}

/// Provider section of the ID token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSection {
    /// Sign-in method used at the provider.
    #[serde(default)]
    pub sign_in_provider: Option<String>,
}

impl IdTokenClaims {
    /// Converts the raw payload into [`ExternalClaims`].
    ///
    /// Blank strings are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if `sub` is blank or `exp` is out of range.
    pub fn into_external(
        self,
        default_sub_provider: &str,
    ) -> Result<ExternalClaims, VerificationError> {
        let subject = non_blank(Some(self.sub)).ok_or(VerificationError::MissingClaim("sub"))?;

        let expires_at = OffsetDateTime::from_unix_timestamp(self.exp)
            .map_err(|e| VerificationError::invalid_claim("exp", e.to_string()))?;

        let sub_provider = non_blank(self.firebase.and_then(|f| f.sign_in_provider))
            .unwrap_or_else(|| default_sub_provider.to_string());

        Ok(ExternalClaims {
            subject,
            email: non_blank(self.email),
            display_name: non_blank(self.name),
            picture: non_blank(self.picture),
            email_verified: self.email_verified.unwrap_or(false),
            sub_provider,
            expires_at,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: serde_json::Value) -> IdTokenClaims {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_into_external_full() {
        let claims = raw(serde_json::json!({
            "sub": "uid-123",
            "exp": 1_900_000_000,
            "email": "a@x.com",
            "email_verified": true,
            "name": "Alice",
            "picture": "https://cdn.example.com/a.png",
            "firebase": { "sign_in_provider": "google.com" }
        }))
        .into_external(DEFAULT_SUB_PROVIDER)
        .unwrap();

        assert_eq!(claims.subject, "uid-123");
        assert_eq!(claims.email.as_deref(), Some("a@x.com"));
        assert_eq!(claims.display_name.as_deref(), Some("Alice"));
        assert_eq!(claims.picture.as_deref(), Some("https://cdn.example.com/a.png"));
        assert!(claims.email_verified);
        assert_eq!(claims.sub_provider, "google.com");
        assert_eq!(claims.expires_at.unix_timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_into_external_minimal_uses_defaults() {
        let claims = raw(serde_json::json!({ "sub": "uid-1", "exp": 1_900_000_000 }))
            .into_external("oidc")
            .unwrap();

        assert_eq!(claims.email, None);
        assert_eq!(claims.display_name, None);
        assert!(!claims.email_verified);
        assert_eq!(claims.sub_provider, "oidc");
    }

    #[test]
    fn test_blank_strings_are_absent() {
        let claims = raw(serde_json::json!({
            "sub": "uid-1",
            "exp": 1_900_000_000,
            "email": "  ",
            "name": "",
            "firebase": { "sign_in_provider": "" }
        }))
        .into_external(DEFAULT_SUB_PROVIDER)
        .unwrap();

        assert_eq!(claims.email, None);
        assert_eq!(claims.display_name, None);
        assert_eq!(claims.sub_provider, DEFAULT_SUB_PROVIDER);
    }

    #[test]
    fn test_missing_subject_is_rejected() {
        let err = raw(serde_json::json!({ "exp": 1_900_000_000 }))
            .into_external(DEFAULT_SUB_PROVIDER)
            .unwrap_err();
        assert!(matches!(err, VerificationError::MissingClaim("sub")));
    }

    #[test]
    fn test_out_of_range_expiry_is_rejected() {
        let err = raw(serde_json::json!({ "sub": "uid-1", "exp": i64::MAX }))
            .into_external(DEFAULT_SUB_PROVIDER)
            .unwrap_err();
        assert!(matches!(
            err,
            VerificationError::InvalidClaim { claim: "exp", .. }
        ));
    }

    #[test]
    fn test_builder() {
        let exp = OffsetDateTime::now_utc();
        let claims = ExternalClaims::new("uid-1", exp)
            .with_email("a@x.com")
            .with_display_name("Alice")
            .with_picture("p.png")
            .with_email_verified(true)
            .with_sub_provider("password");

        assert_eq!(claims.email.as_deref(), Some("a@x.com"));
        assert_eq!(claims.sub_provider, "password");
        assert_eq!(claims.expires_at, exp);
    }
}
