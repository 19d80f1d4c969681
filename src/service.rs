//! Directory lookup with a time-boxed cache.
//!
//! A cache hit never touches the network. On a miss the service connects,
//! binds and searches once, without retries. Only records whose published
//! email contains the trusted domain are written back, each with its own
//! random lifetime.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::cache::{CacheBackend, random_lifetime};
use crate::clock::Clock;
use crate::config::Configuration;
use crate::credentials::CredentialProvider;
use crate::diagnostics::DiagnosticsConfig;
use crate::error::{FailureKind, LookupError};
use crate::ldap::{Directory, FilterEscaping, SearchRequest, uid_filter};
use crate::record::DirectoryRecord;
use crate::telemetry::Telemetry;

/// Where a found record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Directory,
}

/// Detailed lookup result.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found { record: DirectoryRecord, source: Source },
    NotFound,
    TransportError(FailureKind),
}

impl LookupOutcome {
    /// Collapse into a record; misses and failures become empty.
    pub fn into_record(self) -> DirectoryRecord {
        match self {
            LookupOutcome::Found { record, .. } => record,
            LookupOutcome::NotFound | LookupOutcome::TransportError(_) => {
                DirectoryRecord::empty()
            },
        }
    }
}

/// Fixed search and cache parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSettings {
    pub address: String,
    pub base_dn: String,
    pub attributes: Vec<String>,
    pub credential: String,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub filter_escaping: FilterEscaping,
    pub namespace: String,
    pub lifetime: RangeInclusive<u64>,
    pub trusted_domain: String,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self::from(&Configuration::default())
    }
}

impl From<&Configuration> for LookupSettings {
    fn from(config: &Configuration) -> Self {
        Self {
            address: config.ldap.address(),
            base_dn: config.ldap.base_dn.clone(),
            attributes: config.ldap.attributes.clone(),
            credential: config.ldap.credential.clone(),
            connect_timeout: config.ldap.connect_timeout(),
            operation_timeout: config.ldap.operation_timeout(),
            filter_escaping: config.ldap.filter_escaping,
            namespace: config.cache.namespace.clone(),
            lifetime: config.cache.lifetime(),
            trusted_domain: config.cache.trusted_domain.clone(),
        }
    }
}

/// Directory lookup service.
pub struct LookupService {
    settings: LookupSettings,
    cache: Box<dyn CacheBackend>,
    directory: Box<dyn Directory>,
    credentials: Box<dyn CredentialProvider>,
    telemetry: Box<dyn Telemetry>,
    clock: Box<dyn Clock>,
}

impl LookupService {
    pub fn new(
        settings: LookupSettings,
        cache: Box<dyn CacheBackend>,
        directory: Box<dyn Directory>,
        credentials: Box<dyn CredentialProvider>,
        telemetry: Box<dyn Telemetry>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            cache,
            directory,
            credentials,
            telemetry,
            clock,
        }
    }

    /// Cache key for `key`.
    pub fn cache_key(&self, key: &str) -> String {
        format!("{}:{key}", self.settings.namespace)
    }

    /// Look up `key`, returning an empty record when nothing is found or
    /// the directory cannot be reached.
    ///
    /// Callers cannot tell an unreachable directory from a missing entry;
    /// use [`LookupService::lookup_detailed`] for that.
    pub async fn lookup(
        &self,
        key: &str,
        diagnostics: &DiagnosticsConfig,
    ) -> DirectoryRecord {
        self.lookup_detailed(key, diagnostics).await.into_record()
    }

    /// Look up `key`, keeping the difference between a miss and a failure.
    #[tracing::instrument(skip(self, diagnostics))]
    pub async fn lookup_detailed(
        &self,
        key: &str,
        diagnostics: &DiagnosticsConfig,
    ) -> LookupOutcome {
        let cid = self.cache_key(key);
        diagnostics.emit_tls_environment();

        if let Some(record) = self.cached(&cid).await {
            self.telemetry.record_cache_hit(&cid);
            diagnostics.emit("Cache found.");
            diagnostics.emit(format_args!("cached LDAP entry: {record:?}"));

            return found(record, Source::Cache);
        }

        self.telemetry.record_cache_miss(&cid);
        diagnostics.emit("No cache found.");

        let record = match self.fetch(key, diagnostics).await {
            Ok(record) => record,
            Err(err) => {
                let kind = err.kind().unwrap_or(FailureKind::Search);
                self.telemetry.record_failure(&cid, kind, &err.to_string());
                return LookupOutcome::TransportError(kind);
            },
        };

        diagnostics.emit(format_args!("fresh LDAP entry: {record:?}"));

        if record.is_trusted(&self.settings.trusted_domain) {
            self.store(&cid, &record).await;
        } else {
            self.telemetry.record_cache_skip(&cid);
        }

        found(record, Source::Directory)
    }

    /// Unexpired cached record. Backend errors count as a miss.
    async fn cached(&self, cid: &str) -> Option<DirectoryRecord> {
        match self.cache.get(cid).await {
            Ok(Some(item)) if !item.is_expired(self.clock.now()) => {
                Some(item.data)
            },
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(key = cid, %err, "cache read failed");
                None
            },
        }
    }

    async fn fetch(
        &self,
        key: &str,
        diagnostics: &DiagnosticsConfig,
    ) -> Result<DirectoryRecord, LookupError> {
        let credentials = self
            .credentials
            .credential(&self.settings.credential)
            .ok_or_else(|| LookupError::MissingCredentials {
                name: self.settings.credential.clone(),
            })?;

        let request = SearchRequest {
            address: self.settings.address.clone(),
            base_dn: self.settings.base_dn.clone(),
            filter: uid_filter(key, self.settings.filter_escaping),
            attributes: self.settings.attributes.clone(),
            connect_timeout: self.settings.connect_timeout,
            operation_timeout: self.settings.operation_timeout,
        };

        self.directory
            .search(&request, &credentials, diagnostics)
            .await
    }

    async fn store(&self, cid: &str, record: &DirectoryRecord) {
        let expires_at =
            self.clock.now() + random_lifetime(self.settings.lifetime.clone());

        match self.cache.set(cid, record, expires_at).await {
            Ok(()) => self.telemetry.record_cache_store(cid, expires_at),
            Err(err) => tracing::warn!(key = cid, %err, "cache write failed"),
        }
    }
}

fn found(record: DirectoryRecord, source: Source) -> LookupOutcome {
    if record.is_empty() {
        LookupOutcome::NotFound
    } else {
        LookupOutcome::Found { record, source }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use ldap3::LdapError;

    use super::*;
    use crate::cache::{CacheItem, MAX_LIFETIME, MIN_LIFETIME, MemoryCache};
    use crate::clock::FixedClock;
    use crate::credentials::{Credentials, StaticCredentials};
    use crate::error::Result;
    use crate::formatter::format_as_display_text;
    use crate::record::{CAMPUS_ADDRESS, DirectoryEntry, PUBLISHED_EMAIL};

    const NOW: u64 = 1_700_000_000;

    #[derive(Clone, Copy)]
    enum Reply {
        Record,
        Foreign,
        Nothing,
        Fail(FailureKind),
    }

    /// Directory answering with a canned reply and counting calls.
    struct FakeDirectory {
        reply: Reply,
        calls: Arc<AtomicUsize>,
        requests: Arc<Mutex<Vec<SearchRequest>>>,
    }

    fn entry(email: &str) -> DirectoryRecord {
        DirectoryEntry::default()
            .with(CAMPUS_ADDRESS, ["123 Main St"])
            .with(PUBLISHED_EMAIL, [email])
            .into()
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn search(
            &self,
            request: &SearchRequest,
            _credentials: &Credentials,
            _diagnostics: &DiagnosticsConfig,
        ) -> Result<DirectoryRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());

            match self.reply {
                Reply::Record => Ok(entry("jdoe123@cornell.edu")),
                Reply::Foreign => Ok(entry("jdoe123@example.com")),
                Reply::Nothing => Ok(DirectoryRecord::empty()),
                Reply::Fail(FailureKind::Connection) => {
                    Err(LookupError::Connection(LdapError::EndOfStream))
                },
                Reply::Fail(FailureKind::Authentication) => {
                    Err(LookupError::Authentication(LdapError::EndOfStream))
                },
                Reply::Fail(FailureKind::Search) => {
                    Err(LookupError::Search(LdapError::EndOfStream))
                },
            }
        }
    }

    #[derive(Default)]
    struct RecordingTelemetry {
        failures: Mutex<Vec<FailureKind>>,
        stores: AtomicUsize,
    }

    impl Telemetry for Arc<RecordingTelemetry> {
        fn record_cache_hit(&self, _key: &str) {}

        fn record_cache_miss(&self, _key: &str) {}

        fn record_cache_store(&self, _key: &str, _expires_at: u64) {
            self.stores.fetch_add(1, Ordering::SeqCst);
        }

        fn record_cache_skip(&self, _key: &str) {}

        fn record_failure(&self, _key: &str, kind: FailureKind, _details: &str) {
            self.failures.lock().unwrap().push(kind);
        }
    }

    /// Cache shared with the test through an [`Arc`].
    struct SharedCache(Arc<MemoryCache>);

    #[async_trait]
    impl CacheBackend for SharedCache {
        async fn get(&self, key: &str) -> Result<Option<CacheItem>> {
            self.0.get(key).await
        }

        async fn set(
            &self,
            key: &str,
            data: &DirectoryRecord,
            expires_at: u64,
        ) -> Result<()> {
            self.0.set(key, data, expires_at).await
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl CacheBackend for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<CacheItem>> {
            Err(LookupError::Cache("connection refused".into()))
        }

        async fn set(
            &self,
            _key: &str,
            _data: &DirectoryRecord,
            _expires_at: u64,
        ) -> Result<()> {
            Err(LookupError::Cache("connection refused".into()))
        }
    }

    struct Harness {
        service: LookupService,
        cache: Arc<MemoryCache>,
        calls: Arc<AtomicUsize>,
        requests: Arc<Mutex<Vec<SearchRequest>>>,
        telemetry: Arc<RecordingTelemetry>,
        clock: Arc<FixedClock>,
    }

    fn harness(reply: Reply) -> Harness {
        harness_with(reply, LookupSettings::default(), true)
    }

    fn harness_with(
        reply: Reply,
        settings: LookupSettings,
        with_credentials: bool,
    ) -> Harness {
        let clock = Arc::new(FixedClock::new(NOW));
        let cache =
            Arc::new(MemoryCache::with_clock(Box::new(Arc::clone(&clock))));
        let calls = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let telemetry = Arc::new(RecordingTelemetry::default());

        let mut credentials = StaticCredentials::new();
        if with_credentials {
            credentials = credentials.with(
                settings.credential.clone(),
                Credentials::new("uid=reader,ou=Directory Administrators", "pw"),
            );
        }

        let service = LookupService::new(
            settings,
            Box::new(SharedCache(Arc::clone(&cache))),
            Box::new(FakeDirectory {
                reply,
                calls: Arc::clone(&calls),
                requests: Arc::clone(&requests),
            }),
            Box::new(credentials),
            Box::new(Arc::clone(&telemetry)),
            Box::new(Arc::clone(&clock)),
        );

        Harness {
            service,
            cache,
            calls,
            requests,
            telemetry,
            clock,
        }
    }

    #[tokio::test]
    async fn test_fresh_trusted_lookup_is_cached() {
        let h = harness(Reply::Record);
        let diagnostics = DiagnosticsConfig::disabled();

        let record = h.service.lookup("jdoe123", &diagnostics).await;

        assert_eq!(
            format_as_display_text(&record),
            "123 Main St<br />\
             <a href=\"mailto:jdoe123@cornell.edu\">jdoe123@cornell.edu</a><br />"
        );
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);

        let item = h
            .cache
            .get("as_people_ldap:jdoe123")
            .await
            .unwrap()
            .expect("trusted record must be cached");
        assert_eq!(item.data, record);
        assert!(item.expires_at >= NOW + MIN_LIFETIME);
        assert!(item.expires_at <= NOW + MAX_LIFETIME);
        assert_eq!(h.telemetry.stores.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_directory() {
        let h = harness(Reply::Record);
        let cached = entry("cached@cornell.edu");
        h.cache
            .set("as_people_ldap:jdoe123", &cached, NOW + 60)
            .await
            .unwrap();

        let outcome = h
            .service
            .lookup_detailed("jdoe123", &DiagnosticsConfig::disabled())
            .await;

        assert_eq!(outcome, LookupOutcome::Found {
            record: cached,
            source: Source::Cache,
        });
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let h = harness(Reply::Record);
        h.cache
            .set("as_people_ldap:jdoe123", &entry("old@cornell.edu"), NOW + 60)
            .await
            .unwrap();
        h.clock.advance(60);

        let outcome = h
            .service
            .lookup_detailed("jdoe123", &DiagnosticsConfig::disabled())
            .await;

        assert_eq!(outcome, LookupOutcome::Found {
            record: entry("jdoe123@cornell.edu"),
            source: Source::Directory,
        });
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_untrusted_record_is_not_cached() {
        let h = harness(Reply::Foreign);
        let diagnostics = DiagnosticsConfig::disabled();

        let first = h.service.lookup("jdoe123", &diagnostics).await;
        let second = h.service.lookup("jdoe123", &diagnostics).await;

        assert_eq!(first, entry("jdoe123@example.com"));
        assert_eq!(first, second);
        assert!(h.cache.is_empty().await);
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found() {
        let h = harness(Reply::Nothing);

        let outcome = h
            .service
            .lookup_detailed("nobody", &DiagnosticsConfig::disabled())
            .await;

        assert_eq!(outcome, LookupOutcome::NotFound);
        assert!(h.cache.is_empty().await);
        assert!(h.telemetry.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure_is_empty() {
        let h = harness(Reply::Fail(FailureKind::Connection));
        let diagnostics = DiagnosticsConfig::disabled();

        let outcome = h.service.lookup_detailed("jdoe123", &diagnostics).await;
        assert_eq!(
            outcome,
            LookupOutcome::TransportError(FailureKind::Connection)
        );
        assert_eq!(*h.telemetry.failures.lock().unwrap(), vec![
            FailureKind::Connection
        ]);
        assert!(h.cache.is_empty().await);

        assert!(outcome.into_record().is_empty());
    }

    #[tokio::test]
    async fn test_bind_and_search_failures() {
        for kind in [FailureKind::Authentication, FailureKind::Search] {
            let h = harness(Reply::Fail(kind));

            let record = h
                .service
                .lookup("jdoe123", &DiagnosticsConfig::disabled())
                .await;

            assert!(record.is_empty());
            assert_eq!(*h.telemetry.failures.lock().unwrap(), vec![kind]);
            assert!(h.cache.is_empty().await);
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_never_search() {
        let h = harness_with(Reply::Record, LookupSettings::default(), false);

        let outcome = h
            .service
            .lookup_detailed("jdoe123", &DiagnosticsConfig::disabled())
            .await;

        assert_eq!(
            outcome,
            LookupOutcome::TransportError(FailureKind::Authentication)
        );
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_request() {
        let h = harness(Reply::Nothing);
        h.service
            .lookup("jdoe123", &DiagnosticsConfig::disabled())
            .await;

        let requests = h.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.address, "ldaps://query.directory.cornell.edu:636");
        assert_eq!(request.base_dn, "ou=People,o=Cornell University,c=US");
        assert_eq!(request.filter, "(uid=jdoe123)");
        assert_eq!(request.attributes, [
            "cn",
            "cornelleducampusaddress",
            "cornelledupublishedemail",
            "cornelleducampusphone",
        ]);
    }

    #[tokio::test]
    async fn test_escaped_filter_setting() {
        let settings = LookupSettings {
            filter_escaping: FilterEscaping::Escaped,
            ..Default::default()
        };
        let h = harness_with(Reply::Nothing, settings, true);

        h.service.lookup("*", &DiagnosticsConfig::disabled()).await;

        assert_eq!(h.requests.lock().unwrap()[0].filter, r"(uid=\2a)");
    }

    #[tokio::test]
    async fn test_broken_cache_still_returns_record() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = LookupService::new(
            LookupSettings::default(),
            Box::new(BrokenCache),
            Box::new(FakeDirectory {
                reply: Reply::Record,
                calls: Arc::clone(&calls),
                requests: Arc::new(Mutex::new(Vec::new())),
            }),
            Box::new(
                StaticCredentials::new()
                    .with("as_people_ldap", Credentials::new("uid=reader", "pw")),
            ),
            Box::new(crate::telemetry::TracingTelemetry::new()),
            Box::new(FixedClock::new(NOW)),
        );

        let record = service
            .lookup("jdoe123", &DiagnosticsConfig::disabled())
            .await;

        assert_eq!(record, entry("jdoe123@cornell.edu"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_key() {
        let h = harness(Reply::Nothing);
        assert_eq!(h.service.cache_key("jdoe123"), "as_people_ldap:jdoe123");
    }
}
