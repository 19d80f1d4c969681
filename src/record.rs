//! Directory records returned by a lookup.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Common name.
pub const COMMON_NAME: &str = "cn";
/// Campus address.
pub const CAMPUS_ADDRESS: &str = "cornelleducampusaddress";
/// Published email.
pub const PUBLISHED_EMAIL: &str = "cornelledupublishedemail";
/// Campus phone.
pub const CAMPUS_PHONE: &str = "cornelleducampusphone";

/// Attributes requested on every search.
pub const DEFAULT_ATTRIBUTES: [&str; 4] =
    [COMMON_NAME, CAMPUS_ADDRESS, PUBLISHED_EMAIL, CAMPUS_PHONE];

/// One directory entry, with multi-valued attributes.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Create a new [`DirectoryEntry`].
    ///
    /// Attribute names are case-insensitive on the directory side, so they
    /// are stored lower-cased.
    pub fn new(
        dn: impl Into<String>,
        attributes: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            dn: dn.into(),
            attributes: attributes
                .into_iter()
                .map(|(name, values)| (name.to_lowercase(), values))
                .collect(),
        }
    }

    /// Add values for one attribute.
    pub fn with(
        mut self,
        name: &str,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.attributes.insert(
            name.to_lowercase(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Value at `index` for attribute `name`.
    pub fn value(&self, name: &str, index: usize) -> Option<&str> {
        self.attributes
            .get(&name.to_lowercase())
            .and_then(|values| values.get(index))
            .map(String::as_str)
    }
}

/// Result of a single search. An absent record has no entries.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub entries: Vec<DirectoryEntry>,
}

impl DirectoryRecord {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self { entries }
    }

    /// Empty record, returned for misses and failures.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry; the only one consumed downstream.
    pub fn first(&self) -> Option<&DirectoryEntry> {
        self.entries.first()
    }

    /// Whether the first entry carries a published email containing
    /// `domain`. Only such records are cached.
    pub fn is_trusted(&self, domain: &str) -> bool {
        self.first()
            .and_then(|entry| entry.value(PUBLISHED_EMAIL, 0))
            .is_some_and(|email| !email.is_empty() && email.contains(domain))
    }
}

impl From<DirectoryEntry> for DirectoryRecord {
    fn from(entry: DirectoryEntry) -> Self {
        Self::new(vec![entry])
    }
}
