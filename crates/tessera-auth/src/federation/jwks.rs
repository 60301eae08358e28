//! Identity provider signing keys.
//!
//! [`JwksCache`] fetches the JSON Web Key Set of a single identity provider
//! endpoint and keeps it in memory for the TTL advertised by the provider's
//! `Cache-Control: max-age`, clamped to the configured bounds.
//!
//! A token signed with a key id that is not in the cached set triggers one
//! refetch, so provider key rotation is picked up without waiting for the TTL.

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

use super::error::JwksError;
use crate::config::JwksCacheConfig;

/// Decoding key resolved from the key set.
pub struct SigningKey {
    /// Key for signature verification.
    pub key: DecodingKey,
    /// Algorithm pinned by the key, if it declares one.
    pub algorithm: Option<Algorithm>,
}

struct CachedJwks {
    jwks: JwkSet,
    expires_at: Instant,
}

/// Cached key set of one JWKS endpoint.
pub struct JwksCache {
    http_client: reqwest::Client,
    jwks_uri: Url,
    cached: RwLock<Option<CachedJwks>>,
    config: JwksCacheConfig,
    allow_http: bool,
}

impl JwksCache {
    /// Creates a cache for `jwks_uri`. Nothing is fetched until the first lookup.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::InvalidScheme` if the URI is not HTTPS (or HTTP
    /// with `allow_http`), or `JwksError::NetworkError` if the HTTP client
    /// cannot be built.
    pub fn new(
        jwks_uri: Url,
        config: JwksCacheConfig,
        request_timeout: Duration,
        allow_http: bool,
    ) -> Result<Self, JwksError> {
        validate_scheme(&jwks_uri, allow_http)?;

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            jwks_uri,
            cached: RwLock::new(None),
            config,
            allow_http,
        })
    }

    /// The endpoint this cache serves.
    #[must_use]
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    /// Looks up the signing key with id `kid`.
    ///
    /// Serves from cache while it is fresh; otherwise, or when `kid` is not
    /// in the cached set, refetches once.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::KeyNotFound` if the key is absent after the
    /// refetch, or the fetch error.
    pub async fn get_key(&self, kid: &str) -> Result<SigningKey, JwksError> {
        if let Some(found) = self.cached_key(kid).await {
            tracing::trace!(kid, "JWKS cache hit");
            return found;
        }

        tracing::debug!(kid, jwks_uri = %self.jwks_uri, "JWKS cache miss");
        self.refresh().await?;

        self.cached_key(kid)
            .await
            .unwrap_or_else(|| Err(JwksError::KeyNotFound(kid.to_string())))
    }

    async fn cached_key(&self, kid: &str) -> Option<Result<SigningKey, JwksError>> {
        let cached = self.cached.read().await;
        let cached = cached.as_ref()?;

        if Instant::now() >= cached.expires_at {
            return None;
        }

        cached
            .jwks
            .keys
            .iter()
            .filter(|k| !matches!(k.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .map(to_signing_key)
    }

    /// Fetches the key set and replaces the cached copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not a success,
    /// the body exceeds the size limit, or the body is not a key set.
    pub async fn refresh(&self) -> Result<(), JwksError> {
        validate_scheme(&self.jwks_uri, self.allow_http)?;

        tracing::debug!(jwks_uri = %self.jwks_uri, "Fetching JWKS");

        let response = self
            .http_client
            .get(self.jwks_uri.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(jwks_uri = %self.jwks_uri, error = %e, "Failed to fetch JWKS");
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        let max_size = self.config.max_response_size;
        if let Some(len) = response.content_length()
            && len > max_size as u64
        {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        let ttl = cache_ttl(response.headers(), &self.config);

        let body = response
            .bytes()
            .await
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;
        if body.len() > max_size {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        let jwks: JwkSet = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(jwks_uri = %self.jwks_uri, error = %e, "Failed to parse JWKS");
            JwksError::ParseError(e.to_string())
        })?;

        tracing::debug!(
            jwks_uri = %self.jwks_uri,
            keys = jwks.keys.len(),
            ttl = ?ttl,
            "Cached JWKS"
        );

        *self.cached.write().await = Some(CachedJwks {
            jwks,
            expires_at: Instant::now() + ttl,
        });

        Ok(())
    }

    /// Drops the cached key set; the next lookup refetches.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
        tracing::debug!(jwks_uri = %self.jwks_uri, "Invalidated JWKS cache");
    }

    /// Returns `true` if a key set is cached and fresh.
    pub async fn is_fresh(&self) -> bool {
        self.cached
            .read()
            .await
            .as_ref()
            .is_some_and(|c| Instant::now() < c.expires_at)
    }
}

fn validate_scheme(uri: &Url, allow_http: bool) -> Result<(), JwksError> {
    match uri.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        _ => Err(JwksError::InvalidScheme),
    }
}

/// TTL from `Cache-Control: max-age`, clamped to `[min_ttl, max_ttl]`.
fn cache_ttl(headers: &reqwest::header::HeaderMap, config: &JwksCacheConfig) -> Duration {
    let ttl = headers
        .get(reqwest::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.split(',').find_map(|directive| {
                directive
                    .trim()
                    .strip_prefix("max-age=")
                    .and_then(|secs| secs.parse::<u64>().ok())
            })
        })
        .map(Duration::from_secs)
        .unwrap_or(config.default_ttl);

    ttl.min(config.max_ttl).max(config.min_ttl)
}

fn to_signing_key(jwk: &Jwk) -> Result<SigningKey, JwksError> {
    let key = DecodingKey::from_jwk(jwk).map_err(|e| JwksError::InvalidKey(e.to_string()))?;
    Ok(SigningKey {
        key,
        algorithm: jwk_algorithm(jwk),
    })
}

fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue};

    fn headers(cache_control: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_str(cache_control).unwrap());
        headers
    }

    #[test]
    fn test_validate_scheme() {
        let https = Url::parse("https://idp.example.com/jwks").unwrap();
        let http = Url::parse("http://localhost:8080/jwks").unwrap();
        let ftp = Url::parse("ftp://idp.example.com/jwks").unwrap();

        assert!(validate_scheme(&https, false).is_ok());
        assert!(matches!(
            validate_scheme(&http, false),
            Err(JwksError::InvalidScheme)
        ));
        assert!(validate_scheme(&http, true).is_ok());
        assert!(validate_scheme(&ftp, true).is_err());
    }

    #[test]
    fn test_cache_ttl() {
        let config = JwksCacheConfig::default();

        assert_eq!(
            cache_ttl(&headers("public, max-age=7200"), &config),
            Duration::from_secs(7200)
        );
        assert_eq!(
            cache_ttl(&headers("max-age=10, must-revalidate"), &config),
            config.min_ttl
        );
        assert_eq!(
            cache_ttl(&headers("max-age=999999999"), &config),
            config.max_ttl
        );
        assert_eq!(cache_ttl(&headers("no-cache"), &config), config.default_ttl);
        assert_eq!(cache_ttl(&HeaderMap::new(), &config), config.default_ttl);
        assert_eq!(
            cache_ttl(&headers("max-age=soon"), &config),
            config.default_ttl
        );
    }

    #[test]
    fn test_new_rejects_http_without_opt_in() {
        let uri = Url::parse("http://idp.example.com/jwks").unwrap();
        let result = JwksCache::new(
            uri,
            JwksCacheConfig::default(),
            Duration::from_secs(1),
            false,
        );
        assert!(matches!(result, Err(JwksError::InvalidScheme)));
    }

    #[tokio::test]
    async fn test_invalidate_empty_cache() {
        let uri = Url::parse("https://idp.example.com/jwks").unwrap();
        let cache = JwksCache::new(
            uri.clone(),
            JwksCacheConfig::default(),
            Duration::from_secs(1),
            false,
        )
        .unwrap();

        assert_eq!(cache.jwks_uri(), &uri);
        assert!(!cache.is_fresh().await);
        cache.invalidate().await;
        assert!(!cache.is_fresh().await);
    }

    #[test]
    fn test_jwk_algorithm() {
        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kty": "RSA",
            "kid": "k1",
            "alg": "RS256",
            "use": "sig",
            "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw",
            "e": "AQAB"
        }))
        .unwrap();

        assert_eq!(jwk_algorithm(&jwk), Some(Algorithm::RS256));
        let signing = to_signing_key(&jwk).unwrap();
        assert_eq!(signing.algorithm, Some(Algorithm::RS256));
    }
}
