//! Error handler for people-ldap.

use ldap3::LdapError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LookupError>;

/// Errors raised while resolving a lookup key.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("unable to connect to LDAP server: {0}")]
    Connection(#[source] LdapError),

    #[error("unable to bind to LDAP server: {0}")]
    Authentication(#[source] LdapError),

    #[error("unable to search LDAP directory: {0}")]
    Search(#[source] LdapError),

    #[error("no credential named `{name}`")]
    MissingCredentials { name: String },

    #[error("cache backend failed, {0}")]
    Cache(String),

    #[error("invalid cache payload")]
    Payload(#[from] serde_json::Error),
}

impl LookupError {
    /// Transport stage that failed, if the error comes from the directory.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            LookupError::Connection(_) => Some(FailureKind::Connection),
            LookupError::Authentication(_)
            | LookupError::MissingCredentials { .. } => {
                Some(FailureKind::Authentication)
            },
            LookupError::Search(_) => Some(FailureKind::Search),
            LookupError::Cache(_) | LookupError::Payload(_) => None,
        }
    }
}

/// Stage of a directory round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connection,
    Authentication,
    Search,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Connection => "connection",
            FailureKind::Authentication => "authentication",
            FailureKind::Search => "search",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
