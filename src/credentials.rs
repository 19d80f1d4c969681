//! Bind credentials.
//!
//! Credentials are owned by an external secret store. This crate only
//! reads them, by logical name, at lookup time.

use std::collections::HashMap;

/// Value shown instead of a bind secret.
pub const MASKED_SECRET: &str = "XxXxXxX";

/// Bind identity and secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    secret: String,
}

impl Credentials {
    /// Create a new [`Credentials`].
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &MASKED_SECRET)
            .finish()
    }
}

/// Capability to resolve a credential pair by logical name.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self, name: &str) -> Option<Credentials>;
}

/// In-memory credential store.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    entries: HashMap<String, Credentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential pair under `name`.
    pub fn with(mut self, name: impl Into<String>, credentials: Credentials) -> Self {
        self.entries.insert(name.into(), credentials);
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self, name: &str) -> Option<Credentials> {
        self.entries.get(name).cloned()
    }
}

/// Read credentials from `<NAME>_BIND_DN` and `<NAME>_BIND_PASSWORD`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl EnvCredentials {
    fn variable(name: &str, suffix: &str) -> String {
        let prefix: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{prefix}_{suffix}")
    }
}

impl CredentialProvider for EnvCredentials {
    fn credential(&self, name: &str) -> Option<Credentials> {
        let identity = std::env::var(Self::variable(name, "BIND_DN")).ok()?;
        let secret =
            std::env::var(Self::variable(name, "BIND_PASSWORD")).ok()?;

        Some(Credentials::new(identity, secret))
    }
}
