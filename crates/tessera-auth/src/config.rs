//! Federation configuration.
//!
//! The federated scheme receives its configuration as an opaque JSON blob at
//! initialization. It is parsed into [`FederationConfig`] and validated once;
//! a malformed blob is a startup error, never a per-request one.
//!
//! # Example (JSON)
//!
//! ```json
//! {
//!   "default_auth_level": "auth",
//!   "verify_timeout": "15s",
//!   "store_timeout": "5s",
//!   "verifier": {
//!     "credentials_file": "/etc/tessera/service-account.json",
//!     "leeway": "60s"
//!   }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::AuthLevel;

/// Issuer prefix of secure-token ID tokens; the project id is appended.
pub const SECURE_TOKEN_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// JWKS endpoint publishing the secure-token signing keys.
pub const SECURE_TOKEN_JWKS_URI: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration blob could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A referenced file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Root configuration of the federated authentication scheme.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Auth level assigned to newly provisioned accounts.
    pub default_auth_level: AuthLevel,

    /// Use the display name as the federation username when the token has
    /// no email claim.
    pub allow_display_name_fallback: bool,

    /// Upper bound for a single identity provider verification.
    #[serde(with = "humantime_serde")]
    pub verify_timeout: Duration,

    /// Upper bound for a single account store call.
    #[serde(with = "humantime_serde")]
    pub store_timeout: Duration,

    /// Identity provider verifier settings.
    pub verifier: VerifierConfig,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            default_auth_level: AuthLevel::Auth,
            allow_display_name_fallback: true,
            verify_timeout: Duration::from_secs(15),
            store_timeout: Duration::from_secs(5),
            verifier: VerifierConfig::default(),
        }
    }
}

impl FederationConfig {
    /// Parses the configuration from a JSON blob.
    ///
    /// An empty blob yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the blob is not valid JSON for this type.
    pub fn from_json(blob: &[u8]) -> Result<Self, ConfigError> {
        if blob.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(blob)?)
    }

    /// Validates the scheme-level settings.
    ///
    /// Verifier settings are validated once the verifier is resolved, see
    /// [`VerifierConfig::resolve`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a timeout is zero or the default
    /// auth level does not authenticate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verify_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "verify_timeout must be > 0".to_string(),
            ));
        }

        if self.store_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "store_timeout must be > 0".to_string(),
            ));
        }

        if self.default_auth_level < AuthLevel::Auth {
            return Err(ConfigError::InvalidValue(format!(
                "default_auth_level must be auth or root, got '{}'",
                self.default_auth_level
            )));
        }

        Ok(())
    }
}

/// Identity provider verifier configuration.
///
/// Either set `issuer`, `audience` and `jwks_uri` explicitly, or give a
/// `project_id` (directly or through `credentials_file`) to use the
/// secure-token endpoints for that project.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Expected `iss` claim.
    pub issuer: Option<String>,

    /// Accepted `aud` values.
    pub audience: Vec<String>,

    /// JWKS endpoint of the identity provider.
    pub jwks_uri: Option<String>,

    /// Project id for the secure-token preset.
    pub project_id: Option<String>,

    /// Service account JSON file containing a `project_id`.
    pub credentials_file: Option<PathBuf>,

    /// Sub-provider name used when the token does not name one.
    pub default_sub_provider: String,

    /// Clock skew tolerance for `iat`/`nbf` checks.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,

    /// HTTP timeout for JWKS requests.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Allow plain HTTP JWKS endpoints. Testing only.
    pub allow_http: bool,

    /// JWKS cache settings.
    pub jwks_cache: JwksCacheConfig,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: Vec::new(),
            jwks_uri: None,
            project_id: None,
            credentials_file: None,
            default_sub_provider: "external".to_string(),
            leeway: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            allow_http: false,
            jwks_cache: JwksCacheConfig::default(),
        }
    }
}

/// Fully resolved verifier settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVerifierConfig {
    /// Expected `iss` claim.
    pub issuer: String,
    /// Accepted `aud` values, never empty.
    pub audience: Vec<String>,
    /// JWKS endpoint.
    pub jwks_uri: Url,
}

/// Subset of a service account file that the verifier needs.
#[derive(Debug, Deserialize)]
struct ServiceAccountFile {
    project_id: Option<String>,
}

impl VerifierConfig {
    /// Resolves the effective issuer, audience and JWKS endpoint, reading the
    /// credentials file if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials file cannot be read or parsed, if
    /// neither explicit endpoints nor a project id are configured, or if a
    /// resolved value is invalid.
    pub async fn resolve(&self) -> Result<ResolvedVerifierConfig, ConfigError> {
        let project_id = match (&self.project_id, &self.credentials_file) {
            (Some(project), _) => Some(project.clone()),
            (None, Some(path)) => Some(read_project_id(path).await?),
            (None, None) => None,
        };

        let issuer = match (&self.issuer, &project_id) {
            (Some(issuer), _) => issuer.clone(),
            (None, Some(project)) => format!("{SECURE_TOKEN_ISSUER_PREFIX}{project}"),
            (None, None) => return Err(ConfigError::Missing("verifier.issuer".to_string())),
        };

        let audience = if !self.audience.is_empty() {
            self.audience.clone()
        } else if let Some(project) = &project_id {
            vec![project.clone()]
        } else {
            return Err(ConfigError::Missing("verifier.audience".to_string()));
        };

        let jwks_uri = match &self.jwks_uri {
            Some(uri) => uri.as_str(),
            None if project_id.is_some() => SECURE_TOKEN_JWKS_URI,
            None => return Err(ConfigError::Missing("verifier.jwks_uri".to_string())),
        };
        let jwks_uri = Url::parse(jwks_uri).map_err(|e| {
            ConfigError::InvalidValue(format!("verifier.jwks_uri '{jwks_uri}': {e}"))
        })?;

        let resolved = ResolvedVerifierConfig {
            issuer,
            audience,
            jwks_uri,
        };
        self.validate(&resolved)?;
        Ok(resolved)
    }

    fn validate(&self, resolved: &ResolvedVerifierConfig) -> Result<(), ConfigError> {
        if resolved.issuer.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "verifier.issuer cannot be empty".to_string(),
            ));
        }

        if resolved.audience.iter().any(|a| a.trim().is_empty()) {
            return Err(ConfigError::InvalidValue(
                "verifier.audience cannot contain empty values".to_string(),
            ));
        }

        match resolved.jwks_uri.scheme() {
            "https" => {}
            "http" if self.allow_http => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "verifier.jwks_uri scheme '{other}' is not allowed"
                )));
            }
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "verifier.request_timeout must be > 0".to_string(),
            ));
        }

        if self.default_sub_provider.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "verifier.default_sub_provider cannot be empty".to_string(),
            ));
        }

        self.jwks_cache.validate()
    }
}

async fn read_project_id(path: &Path) -> Result<String, ConfigError> {
    let raw = tokio::fs::read(path).await.map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ServiceAccountFile = serde_json::from_slice(&raw)?;
    file.project_id
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing(format!("project_id in {}", path.display())))
}

/// JWKS cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwksCacheConfig {
    /// TTL used when the response has no `Cache-Control: max-age`.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Lower bound for the TTL.
    #[serde(with = "humantime_serde")]
    pub min_ttl: Duration,

    /// Upper bound for the TTL.
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,

    /// Maximum accepted JWKS response size in bytes.
    pub max_response_size: usize,
}

impl Default for JwksCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600), // 1 hour
            min_ttl: Duration::from_secs(300),      // 5 minutes
            max_ttl: Duration::from_secs(86400),    // 24 hours
            max_response_size: 1024 * 1024,         // 1 MB
        }
    }
}

impl JwksCacheConfig {
    /// Validates the TTL bounds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `min_ttl > max_ttl` or the size
    /// limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ttl > self.max_ttl {
            return Err(ConfigError::InvalidValue(
                "verifier.jwks_cache.min_ttl must not exceed max_ttl".to_string(),
            ));
        }

        if self.max_response_size == 0 {
            return Err(ConfigError::InvalidValue(
                "verifier.jwks_cache.max_response_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
