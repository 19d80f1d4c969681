//! Opt-in verbose output for non-production deployments.

use tracing::info;

/// Tracing target for diagnostic events.
pub const TARGET: &str = "people_ldap::diagnostics";

const TLS_VARIABLES: [&str; 3] =
    ["LDAPTLS_CACERT", "LDAPTLS_CACERTDIR", "LDAPTLS_REQCERT"];

/// Deployment the process runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Local development stack.
    Lando,
    Dev,
    Other(String),
}

impl Environment {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "lando" => Environment::Lando,
            "dev" => Environment::Dev,
            other => Environment::Other(other.to_owned()),
        }
    }

    pub fn is_non_production(&self) -> bool {
        matches!(self, Environment::Lando | Environment::Dev)
    }
}

/// Whether diagnostic output is emitted.
///
/// Built once at the boundary and passed to each lookup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    enabled: bool,
}

impl DiagnosticsConfig {
    /// Diagnostics off.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Enable diagnostics only for a non-production environment with the
    /// debug flag set.
    pub fn from_environment(environment: &Environment, debug_mode: bool) -> Self {
        Self {
            enabled: debug_mode && environment.is_non_production(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Emit a diagnostic message.
    pub fn emit(&self, message: impl std::fmt::Display) {
        if self.enabled {
            info!(target: TARGET, "{message}");
        }
    }

    /// Emit the TLS settings picked up by the directory client.
    pub fn emit_tls_environment(&self) {
        if !self.enabled {
            return;
        }

        for name in TLS_VARIABLES {
            let value = std::env::var(name).unwrap_or_default();
            info!(target: TARGET, "{name}={value}");
        }
    }
}
