//! Registry of authentication schemes.
//!
//! The registry is built once at startup and handed to the session layer;
//! after [`AuthSchemeRegistryBuilder::build`] the set of schemes is fixed.
//!
//! # Example
//!
//! ```ignore
//! let registry = AuthSchemeRegistry::builder()
//!     .register("oauth2", Arc::new(FederatedAuthenticator::new(store)))?
//!     .build();
//!
//! registry.initialize([("oauth2", config_blob.as_slice())]).await?;
//! let outcome = registry.authenticate("oauth2", token, "203.0.113.7").await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::scheme::{AuthHandler, AuthOutcome};
use crate::{AuthError, AuthResult};

/// Startup-built set of authentication schemes, keyed by lowercase name.
#[derive(Clone, Default)]
pub struct AuthSchemeRegistry {
    handlers: Arc<HashMap<String, Arc<dyn AuthHandler>>>,
}

impl std::fmt::Debug for AuthSchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSchemeRegistry")
            .field("schemes", &self.names())
            .finish()
    }
}

impl AuthSchemeRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> AuthSchemeRegistryBuilder {
        AuthSchemeRegistryBuilder::default()
    }

    /// Looks up a scheme by name, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn AuthHandler>> {
        self.handlers.get(&normalize(name))
    }

    /// Looks up a scheme by name.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownScheme` if no scheme has that name.
    pub fn handler(&self, name: &str) -> AuthResult<&Arc<dyn AuthHandler>> {
        self.get(name).ok_or_else(|| AuthError::unknown_scheme(name))
    }

    /// Registered scheme names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered schemes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no scheme is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Initializes schemes from `(name, config blob)` pairs.
    ///
    /// Stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownScheme` for an unregistered name, or the
    /// scheme's own initialization error.
    pub async fn initialize<'a, I>(&self, configs: I) -> AuthResult<()>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        for (name, blob) in configs {
            let normalized = normalize(name);
            let handler = self.handler(&normalized)?;
            handler.init(blob, &normalized).await?;
            tracing::info!(scheme = %normalized, "Initialized authentication scheme");
        }
        Ok(())
    }

    /// Authenticates `secret` with the scheme named `scheme`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownScheme` for an unregistered name, or the
    /// scheme's authentication error.
    pub async fn authenticate(
        &self,
        scheme: &str,
        secret: &[u8],
        remote_addr: &str,
    ) -> AuthResult<AuthOutcome> {
        self.handler(scheme)?
            .authenticate(secret, remote_addr)
            .await
    }
}

/// Builder for [`AuthSchemeRegistry`].
#[derive(Default)]
pub struct AuthSchemeRegistryBuilder {
    handlers: HashMap<String, Arc<dyn AuthHandler>>,
}

impl std::fmt::Debug for AuthSchemeRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSchemeRegistryBuilder")
            .field("schemes", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AuthSchemeRegistryBuilder {
    /// Registers `handler` under `name` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::DuplicateScheme` if the name is taken, or
    /// `AuthError::Configuration` if it is blank.
    pub fn register(
        mut self,
        name: impl AsRef<str>,
        handler: Arc<dyn AuthHandler>,
    ) -> AuthResult<Self> {
        let name = normalize(name.as_ref());
        if name.is_empty() {
            return Err(AuthError::configuration("scheme name cannot be empty"));
        }
        if self.handlers.contains_key(&name) {
            return Err(AuthError::duplicate_scheme(name));
        }
        self.handlers.insert(name, handler);
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> AuthSchemeRegistry {
        AuthSchemeRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
