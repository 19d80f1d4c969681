//! People LDAP looks up people in a directory, caches what it trusts and
//! formats it for display.

#![forbid(unsafe_code)]
#![deny(unused_mut)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod diagnostics;
pub mod error;
pub mod formatter;
pub mod ldap;
pub mod record;
pub mod service;
pub mod telemetry;

pub use diagnostics::DiagnosticsConfig;
pub use error::{LookupError, Result};
pub use record::{DirectoryEntry, DirectoryRecord};
pub use service::{LookupOutcome, LookupService, LookupSettings};

use cache::{CacheBackend, MemcacheCache, MemoryCache};
use clock::SystemClock;
use config::{Backend, Configuration};
use credentials::CredentialProvider;

/// Build a [`LookupService`] talking to the configured directory.
pub fn initialize_service(
    config: &Configuration,
    credentials: Box<dyn CredentialProvider>,
) -> Result<LookupService> {
    let cache: Box<dyn CacheBackend> = match config.cache.backend {
        Backend::Memory => Box::new(MemoryCache::new()),
        Backend::Memcache => Box::new(MemcacheCache::connect(
            &config.cache.address,
            Box::new(SystemClock::new()),
        )?),
    };

    Ok(LookupService::new(
        LookupSettings::from(config),
        cache,
        Box::new(ldap::LdapDirectory::new()),
        credentials,
        Box::new(telemetry::TracingTelemetry::new()),
        Box::new(SystemClock::new()),
    ))
}
