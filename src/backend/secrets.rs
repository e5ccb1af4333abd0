//! Secret store client
//!
//! Resolves named credentials without ever exposing the raw value through
//! logs or serialized state.

use async_trait::async_trait;
use thiserror::Error;

/// Error types for secret resolution
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("secret store error: {0}")]
    Backend(String),
}

/// A resolved credential
///
/// Debug and Display both redact the value; only `expose()` reaches it.
/// Deliberately not serializable.
#[derive(Clone)]
pub struct Credential {
    name: String,
    value: String,
}

impl Credential {
    pub fn new(name: &str, value: String) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }

    /// Name of the secret this credential was resolved from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw value; callers must not log it
    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({}, ********)", self.name)
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({}, ********)", self.name)
    }
}

/// Trait for secret stores
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Resolve a named credential
    async fn resolve(&self, name: &str) -> Result<Credential, SecretError>;
}

/// Secret store backed by process environment variables
///
/// A secret name like `ci-github-token` maps to
/// `PIPEWRIGHT_SECRET_CI_GITHUB_TOKEN`.
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self {
            prefix: "PIPEWRIGHT_SECRET_".to_string(),
        }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn var_name(&self, secret_name: &str) -> String {
        let suffix: String = secret_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn resolve(&self, name: &str) -> Result<Credential, SecretError> {
        let var = self.var_name(name);
        match std::env::var(&var) {
            Ok(value) => Ok(Credential::new(name, value)),
            Err(std::env::VarError::NotPresent) => Err(SecretError::NotFound(name.to_string())),
            Err(e) => Err(SecretError::Backend(e.to_string())),
        }
    }
}
