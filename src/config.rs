//! Configuration manager for people-ldap.

use std::fs::File;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{MAX_LIFETIME, MIN_LIFETIME};
use crate::diagnostics::{DiagnosticsConfig, Environment};
use crate::ldap::FilterEscaping;
use crate::record::DEFAULT_ATTRIBUTES;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
/// Overrides `environment` when set.
pub const ENVIRONMENT_VARIABLE: &str = "PANTHEON_ENVIRONMENT";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Deployment name, e.g. `lando`, `dev` or `live`.
    pub environment: Option<String>,
    /// Verbose diagnostics, honoured on non-production deployments only.
    pub debug_mode: bool,
    /// Related to the directory server.
    pub ldap: Ldap,
    /// Related to record caching.
    pub cache: Cache,
    #[serde(skip)]
    path: PathBuf,
}

/// Directory server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ldap {
    /// Hostname of the directory.
    pub host: String,
    pub port: u16,
    /// Use `ldaps://`.
    pub tls: bool,
    /// Search base.
    pub base_dn: String,
    /// Attributes requested on each search.
    pub attributes: Vec<String>,
    /// Logical name given to the credential provider.
    pub credential: String,
    /// Seconds.
    pub connect_timeout: u64,
    /// Seconds, for bind and search.
    pub operation_timeout: u64,
    pub filter_escaping: FilterEscaping,
}

impl Default for Ldap {
    fn default() -> Self {
        Self {
            host: "query.directory.cornell.edu".into(),
            port: 636,
            tls: true,
            base_dn: "ou=People,o=Cornell University,c=US".into(),
            attributes: DEFAULT_ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
            credential: "as_people_ldap".into(),
            connect_timeout: 5,
            operation_timeout: 10,
            filter_escaping: FilterEscaping::default(),
        }
    }
}

impl Ldap {
    /// Server URL with explicit port.
    pub fn address(&self) -> String {
        let scheme = if self.tls { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout)
    }
}

/// Cache backend selection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Memcache,
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cache {
    pub backend: Backend,
    /// Hostname:(?port) for memcached instance.
    pub address: String,
    /// Prefix of every cache key.
    pub namespace: String,
    /// Seconds.
    pub min_lifetime: u64,
    /// Seconds.
    pub max_lifetime: u64,
    /// Published email must contain this to be cached.
    pub trusted_domain: String,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            address: "127.0.0.1:11211".into(),
            namespace: "as_people_ldap".into(),
            min_lifetime: MIN_LIFETIME,
            max_lifetime: MAX_LIFETIME,
            trusted_domain: "cornell.edu".into(),
        }
    }
}

impl Cache {
    pub fn lifetime(&self) -> RangeInclusive<u64> {
        self.min_lifetime..=self.max_lifetime
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Self {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let mut config = match File::open(&file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file) {
                Ok(config) => config,
                Err(err) => self.error(err),
            },
            Err(err) => self.error(err),
        };

        if let Ok(environment) = std::env::var(ENVIRONMENT_VARIABLE) {
            config.environment = Some(environment);
        }

        config.path = file_path;
        config
    }

    /// Deployment environment, empty when unknown.
    pub fn environment(&self) -> Environment {
        Environment::parse(self.environment.as_deref().unwrap_or_default())
    }

    /// Diagnostics gate for this deployment.
    pub fn diagnostics(&self) -> DiagnosticsConfig {
        DiagnosticsConfig::from_environment(&self.environment(), self.debug_mode)
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self::default()
    }
}
