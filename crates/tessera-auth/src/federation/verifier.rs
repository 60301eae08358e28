//! Bearer token verification against an identity provider.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use time::OffsetDateTime;

use super::claims::{ExternalClaims, IdTokenClaims};
use super::error::VerificationError;
use super::jwks::JwksCache;
use crate::config::{ConfigError, ResolvedVerifierConfig, VerifierConfig};

/// Verifies a bearer token with the identity provider.
///
/// Implementations must be safe for concurrent use; the authenticator shares
/// one verifier across all sign-ins.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verifies `token` and returns its claims.
    ///
    /// Token expiry is not judged here; the authenticator compares
    /// [`ExternalClaims::expires_at`] against its own clock.
    async fn verify_token(&self, token: &str) -> Result<ExternalClaims, VerificationError>;
}

/// Verifies ID tokens signed with keys published at a JWKS endpoint.
pub struct JwksVerifier {
    keys: JwksCache,
    issuer: String,
    audience: Vec<String>,
    leeway: u64,
    default_sub_provider: String,
}

impl JwksVerifier {
    /// Builds a verifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be resolved or validated.
    pub async fn from_config(config: &VerifierConfig) -> Result<Self, ConfigError> {
        let resolved = config.resolve().await?;
        Self::from_resolved(config, resolved)
    }

    fn from_resolved(
        config: &VerifierConfig,
        resolved: ResolvedVerifierConfig,
    ) -> Result<Self, ConfigError> {
        let keys = JwksCache::new(
            resolved.jwks_uri,
            config.jwks_cache.clone(),
            config.request_timeout,
            config.allow_http,
        )
        .map_err(|e| ConfigError::InvalidValue(format!("verifier.jwks_uri: {e}")))?;

        tracing::info!(
            issuer = %resolved.issuer,
            jwks_uri = %keys.jwks_uri(),
            "Configured identity provider verifier"
        );

        Ok(Self {
            keys,
            issuer: resolved.issuer,
            audience: resolved.audience,
            leeway: config.leeway.as_secs(),
            default_sub_provider: config.default_sub_provider.clone(),
        })
    }

    /// Expected issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Accepted audiences.
    #[must_use]
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&self.audience);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.validate_exp = false;
        validation.leeway = self.leeway;
        validation
    }
}

#[async_trait]
impl IdentityVerifier for JwksVerifier {
    async fn verify_token(&self, token: &str) -> Result<ExternalClaims, VerificationError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(VerificationError::Rejected("empty token".to_string()));
        }

        let header = decode_header(token)?;
        let kid = header.kid.ok_or(VerificationError::MissingKeyId)?;
        let signing = self.keys.get_key(&kid).await?;

        // A key that pins its algorithm must not be used with another one.
        let alg = signing.algorithm.unwrap_or(header.alg);
        if alg != header.alg {
            return Err(VerificationError::invalid_claim(
                "alg",
                format!("token uses {:?}, key {kid} requires {alg:?}", header.alg),
            ));
        }

        let data = decode::<IdTokenClaims>(token, &signing.key, &self.validation(alg))?;
        let raw = data.claims;

        if let Some(iat) = raw.iat {
            let latest = OffsetDateTime::now_utc().unix_timestamp() + self.leeway as i64;
            if iat > latest {
                return Err(VerificationError::invalid_claim(
                    "iat",
                    "token is issued in the future",
                ));
            }
        }

        let claims = raw.into_external(&self.default_sub_provider)?;

        tracing::debug!(
            sub_provider = %claims.sub_provider,
            issuer = %self.issuer,
            "Verified identity token"
        );

        Ok(claims)
    }
}
