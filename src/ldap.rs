//! LDAP support.

use std::time::Duration;

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use serde::{Deserialize, Serialize};

use crate::credentials::{Credentials, MASKED_SECRET};
use crate::diagnostics::DiagnosticsConfig;
use crate::error::{LookupError, Result};
use crate::record::{DirectoryEntry, DirectoryRecord};

/// How a lookup key is placed into the search filter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterEscaping {
    /// Key is inserted as is. Filter metacharacters change the query.
    #[default]
    Literal,
    /// RFC 4515 escaping of `*`, `(`, `)`, `\` and NUL.
    Escaped,
}

/// Build the `(uid=...)` filter for `key`.
pub fn uid_filter(key: &str, escaping: FilterEscaping) -> String {
    match escaping {
        FilterEscaping::Literal => {
            if has_filter_metacharacters(key) {
                tracing::warn!(
                    key,
                    "lookup key contains filter metacharacters and is used unescaped"
                );
            }
            format!("(uid={key})")
        },
        FilterEscaping::Escaped => format!("(uid={})", escape_ldap(key)),
    }
}

fn has_filter_metacharacters(input: &str) -> bool {
    input.bytes().any(|b| matches!(b, b'*' | b'(' | b')' | b'\\' | 0))
}

fn escape_ldap(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '*' => out.push_str(r"\2a"),
            '(' => out.push_str(r"\28"),
            ')' => out.push_str(r"\29"),
            '\\' => out.push_str(r"\5c"),
            '\0' => out.push_str(r"\00"),
            c => out.push(c),
        }
    }
    out
}

/// Everything needed for one directory round trip, except credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Server URL, e.g. `ldaps://query.directory.cornell.edu:636`.
    pub address: String,
    pub base_dn: String,
    pub filter: String,
    pub attributes: Vec<String>,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
}

/// Port for directory searches.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Connect, bind with `credentials` and search.
    ///
    /// A search matching nothing is an empty record, not an error.
    async fn search(
        &self,
        request: &SearchRequest,
        credentials: &Credentials,
        diagnostics: &DiagnosticsConfig,
    ) -> Result<DirectoryRecord>;
}

/// [`Directory`] backed by `ldap3`. Opens one connection per search.
#[derive(Debug, Default, Clone, Copy)]
pub struct LdapDirectory;

impl LdapDirectory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn search(
        &self,
        request: &SearchRequest,
        credentials: &Credentials,
        diagnostics: &DiagnosticsConfig,
    ) -> Result<DirectoryRecord> {
        diagnostics.emit(format_args!(
            "Attempting to connect to {}.",
            request.address
        ));

        let settings =
            LdapConnSettings::new().set_conn_timeout(request.connect_timeout);
        let (conn, mut ldap) =
            match LdapConnAsync::with_settings(settings, &request.address).await
            {
                Ok(pair) => pair,
                Err(err) => {
                    diagnostics.emit(format_args!("Unable to connect - {err}"));
                    return Err(LookupError::Connection(err));
                },
            };
        ldap3::drive!(conn);

        diagnostics.emit("Connected.");
        diagnostics.emit(format_args!(
            "Attempting to bind with rdn {} and password {MASKED_SECRET}.",
            credentials.identity
        ));

        let bind = ldap
            .with_timeout(request.operation_timeout)
            .simple_bind(&credentials.identity, credentials.secret())
            .await
            .and_then(|res| res.success());
        if let Err(err) = bind {
            diagnostics.emit(format_args!("Unable to bind - {err}"));
            let _ = ldap.unbind().await;
            return Err(LookupError::Authentication(err));
        }

        diagnostics.emit("Bind succeeded.");
        diagnostics.emit(format_args!(
            "Attempting to search with base_dn {}, filter {} and attributes {:?}.",
            request.base_dn, request.filter, request.attributes
        ));

        let attributes: Vec<&str> =
            request.attributes.iter().map(String::as_str).collect();
        let search = ldap
            .with_timeout(request.operation_timeout)
            .search(&request.base_dn, Scope::Subtree, &request.filter, attributes)
            .await
            .and_then(|res| res.success());
        let entries = match search {
            Ok((entries, _)) => entries,
            Err(err) => {
                diagnostics.emit(format_args!("Unable to search - {err}"));
                let _ = ldap.unbind().await;
                return Err(LookupError::Search(err));
            },
        };

        diagnostics.emit("Search succeeded.");

        let record = DirectoryRecord::new(
            entries
                .into_iter()
                .map(SearchEntry::construct)
                .map(|entry| DirectoryEntry::new(entry.dn, entry.attrs))
                .collect(),
        );

        if let Err(err) = ldap.unbind().await {
            tracing::debug!(%err, "LDAP unbind failed");
        }

        Ok(record)
    }
}
