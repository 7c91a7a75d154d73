/*!
 * Published manifest: the ordered list of currently retained bundles
 *
 * The manifest is a single JSON document at a well-known key. It is the
 * single source of truth for what is live; writing it is the commit point of
 * a sync cycle.
 */

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::CacheDescriptor;
use crate::config::{MirrorConfig, DEFAULT_GAME, DEFAULT_LANGUAGE};
use crate::error::{MirrorError, Result};
use crate::storage::{PutOptions, RemoteStore, StorageError};

/// Storage key of the manifest document
pub const MANIFEST_KEY: &str = "caches.json";

/// Storage prefix all bundles live under
pub const BUNDLE_PREFIX: &str = "caches";

/// One published bundle's metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Derived name; unique within the manifest and doubles as the storage
    /// prefix under which the bundle's files live
    pub name: String,

    pub game: String,
    pub environment: String,

    /// Revision (= canonical build major)
    pub build: u32,

    pub timestamp: DateTime<Utc>,
    pub size: u64,
}

impl ManifestEntry {
    /// Build the entry a candidate descriptor would publish as.
    ///
    /// Candidates are pre-filtered to have a build and a timestamp; a
    /// descriptor without either cannot be represented.
    pub fn from_descriptor(descriptor: &CacheDescriptor) -> Result<Self> {
        let build = descriptor.canonical_build().ok_or_else(|| {
            MirrorError::Upstream(format!("bundle {} has no build versions", descriptor.id))
        })?;
        let timestamp = descriptor.timestamp.ok_or_else(|| {
            MirrorError::Upstream(format!("bundle {} has no timestamp", descriptor.id))
        })?;

        Ok(Self {
            name: derive_name(
                &descriptor.game,
                &descriptor.environment,
                build,
                &timestamp,
                &descriptor.language,
            ),
            game: descriptor.game.clone(),
            environment: descriptor.environment.clone(),
            build,
            timestamp,
            size: descriptor.size,
        })
    }

    /// Storage prefix of this bundle's files, without a trailing slash
    pub fn storage_prefix(&self) -> String {
        format!("{}/{}", BUNDLE_PREFIX, self.name)
    }
}

/// Short code a game publishes under
fn game_code(game: &str) -> &str {
    match game {
        "oldschool" => "osrs",
        other => other,
    }
}

/// Deterministic slug identifying a bundle: `<code>[-beta]-<build>_<date>`,
/// with a `-<language>` suffix for non-primary games in a non-default
/// language. The date is the timestamp's date portion.
pub fn derive_name(
    game: &str,
    environment: &str,
    build: u32,
    timestamp: &DateTime<Utc>,
    language: &str,
) -> String {
    let code = game_code(game);
    let date = timestamp.format("%Y-%m-%d");

    let mut name = if environment == "beta" {
        format!("{}-beta-{}_{}", code, build, date)
    } else {
        format!("{}-{}_{}", code, build, date)
    };

    if game != DEFAULT_GAME && language != DEFAULT_LANGUAGE {
        name.push('-');
        name.push_str(language);
    }

    name
}

/// Ordered sequence of published bundle entries, newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(mut entries: Vec<ManifestEntry>) -> Self {
        sort_entries(&mut entries);
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Is a bundle with this derived name already published?
    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Prepend a new entry and restore the newest-first ordering
    pub fn merge(&mut self, entry: ManifestEntry) {
        self.entries.insert(0, entry);
        sort_entries(&mut self.entries);
    }

    /// Split off everything past the retention bound. `self` keeps the first
    /// `keep` entries; the removed tail is returned newest-first.
    pub fn truncate_to(&mut self, keep: usize) -> Vec<ManifestEntry> {
        if self.entries.len() <= keep {
            return Vec::new();
        }
        self.entries.split_off(keep)
    }
}

/// Descending by (build, timestamp); stable, so full ties keep their order
fn sort_entries(entries: &mut [ManifestEntry]) {
    entries.sort_by(|a, b| {
        b.build
            .cmp(&a.build)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
}

/// Read and write access to the published manifest document
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Fetch the published manifest.
    ///
    /// Never errors: a missing document means an empty manifest, and any
    /// other read failure is logged and also treated as empty. This is an
    /// intentional first-run leniency, not silent data loss - an empty read
    /// can mask a transient error and cause a redundant re-publish, which the
    /// idempotent publish path absorbs.
    async fn read(&self) -> Manifest;

    /// Publish the manifest as the canonical document. Must be the last
    /// action of a successful sync cycle: its visibility is the commit point.
    async fn write(&self, manifest: &Manifest) -> Result<()>;
}

/// Decode a fetched manifest document; `None` means the document is absent
pub(crate) fn decode_document(document: Option<Bytes>) -> Manifest {
    match document {
        None => {
            debug!("no published manifest, starting from empty");
            Manifest::default()
        }
        Some(bytes) => match serde_json::from_slice(&bytes) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(error = %e, "published manifest unparseable, treating as empty");
                Manifest::default()
            }
        },
    }
}

/// Manifest store over the bucket's public HTTP face (reads) and the object
/// store (writes)
pub struct PublicManifestStore {
    http: reqwest::Client,
    public_base_url: String,
    store: Arc<dyn RemoteStore>,
}

impl PublicManifestStore {
    pub fn new(config: &MirrorConfig, http: reqwest::Client, store: Arc<dyn RemoteStore>) -> Self {
        Self {
            http,
            public_base_url: config.public_base_url(),
            store,
        }
    }

    /// Fetch the raw document; `Ok(None)` when the bucket answers 404
    async fn fetch_document(&self) -> Result<Option<Bytes>> {
        let url = format!("{}/{}", self.public_base_url, MANIFEST_KEY);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MirrorError::Storage(StorageError::Network(format!("{}: {}", url, e))))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(MirrorError::Storage(StorageError::Network(format!(
                "{}: HTTP {}",
                url,
                response.status()
            ))));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MirrorError::Storage(StorageError::Network(format!("{}: {}", url, e))))?;
        Ok(Some(bytes))
    }
}

#[async_trait]
impl ManifestStore for PublicManifestStore {
    async fn read(&self) -> Manifest {
        let document = match self.fetch_document().await {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, "manifest read failed, treating as empty");
                None
            }
        };
        decode_document(document)
    }

    async fn write(&self, manifest: &Manifest) -> Result<()> {
        let body = serde_json::to_vec(manifest)?;
        self.store
            .put(MANIFEST_KEY, Bytes::from(body), &PutOptions::json_no_cache())
            .await
            .map_err(MirrorError::Storage)?;
        Ok(())
    }
}

/// Manifest store over a [`crate::storage::MemoryStore`], for tests
pub struct MemoryManifestStore {
    store: Arc<crate::storage::MemoryStore>,
}

impl MemoryManifestStore {
    pub fn new(store: Arc<crate::storage::MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn read(&self) -> Manifest {
        decode_document(self.store.get(MANIFEST_KEY))
    }

    async fn write(&self, manifest: &Manifest) -> Result<()> {
        let body = serde_json::to_vec(manifest)?;
        self.store
            .put(MANIFEST_KEY, Bytes::from(body), &PutOptions::json_no_cache())
            .await
            .map_err(MirrorError::Storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn entry(name: &str, build: u32, timestamp: &str) -> ManifestEntry {
        ManifestEntry {
            name: name.to_string(),
            game: "oldschool".to_string(),
            environment: "production".to_string(),
            build,
            timestamp: timestamp.parse().unwrap(),
            size: 1024,
        }
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_derive_name_production() {
        assert_eq!(
            derive_name("oldschool", "production", 231, &ts("2024-05-01T00:00:00Z"), "en"),
            "osrs-231_2024-05-01"
        );
    }

    #[test]
    fn test_derive_name_beta_infix() {
        assert_eq!(
            derive_name("oldschool", "beta", 231, &ts("2024-05-01T00:00:00Z"), "en"),
            "osrs-beta-231_2024-05-01"
        );
    }

    #[test]
    fn test_derive_name_other_game_language_suffix() {
        assert_eq!(
            derive_name("runescape", "production", 920, &ts("2024-05-01T00:00:00Z"), "de"),
            "runescape-920_2024-05-01-de"
        );
        // default language carries no suffix
        assert_eq!(
            derive_name("runescape", "production", 920, &ts("2024-05-01T00:00:00Z"), "en"),
            "runescape-920_2024-05-01"
        );
    }

    #[test]
    fn test_derive_name_uses_date_portion_only() {
        assert_eq!(
            derive_name("oldschool", "production", 231, &ts("2024-05-01T23:59:59Z"), "en"),
            "osrs-231_2024-05-01"
        );
    }

    #[test]
    fn test_merge_keeps_sorted_and_grows_by_one() {
        let mut manifest = Manifest::new(vec![
            entry("osrs-231_2024-05-01", 231, "2024-05-01T00:00:00Z"),
            entry("osrs-229_2024-04-01", 229, "2024-04-01T00:00:00Z"),
        ]);

        manifest.merge(entry("osrs-230_2024-04-15", 230, "2024-04-15T00:00:00Z"));

        assert_eq!(manifest.len(), 3);
        let builds: Vec<u32> = manifest.entries().iter().map(|e| e.build).collect();
        assert_eq!(builds, vec![231, 230, 229]);
    }

    #[test]
    fn test_merge_timestamp_breaks_build_tie() {
        let mut manifest = Manifest::new(vec![entry(
            "osrs-231_2024-05-01",
            231,
            "2024-05-01T00:00:00Z",
        )]);
        manifest.merge(entry("osrs-231_2024-05-03", 231, "2024-05-03T00:00:00Z"));

        assert_eq!(manifest.entries()[0].name, "osrs-231_2024-05-03");
    }

    #[test]
    fn test_contains_name() {
        let manifest = Manifest::new(vec![entry(
            "osrs-231_2024-05-01",
            231,
            "2024-05-01T00:00:00Z",
        )]);
        assert!(manifest.contains_name("osrs-231_2024-05-01"));
        assert!(!manifest.contains_name("osrs-232_2024-05-15"));
    }

    #[test]
    fn test_truncate_to() {
        let mut manifest = Manifest::new(vec![
            entry("e5", 235, "2024-05-05T00:00:00Z"),
            entry("e4", 234, "2024-05-04T00:00:00Z"),
            entry("e3", 233, "2024-05-03T00:00:00Z"),
            entry("e2", 232, "2024-05-02T00:00:00Z"),
            entry("e1", 231, "2024-05-01T00:00:00Z"),
        ]);

        let removed = manifest.truncate_to(2);

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.entries()[0].name, "e5");
        assert_eq!(manifest.entries()[1].name, "e4");
        let removed_names: Vec<&str> = removed.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(removed_names, vec!["e3", "e2", "e1"]);
    }

    #[test]
    fn test_truncate_within_bound_removes_nothing() {
        let mut manifest = Manifest::new(vec![entry("e1", 231, "2024-05-01T00:00:00Z")]);
        assert!(manifest.truncate_to(5).is_empty());
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_storage_prefix() {
        let e = entry("osrs-231_2024-05-01", 231, "2024-05-01T00:00:00Z");
        assert_eq!(e.storage_prefix(), "caches/osrs-231_2024-05-01");
    }

    #[test]
    fn test_decode_missing_document_is_empty() {
        assert!(decode_document(None).is_empty());
    }

    #[test]
    fn test_decode_garbage_document_is_empty() {
        assert!(decode_document(Some(Bytes::from("not json"))).is_empty());
    }

    #[test]
    fn test_decode_valid_document() {
        let manifest = Manifest::new(vec![entry(
            "osrs-231_2024-05-01",
            231,
            "2024-05-01T00:00:00Z",
        )]);
        let bytes = Bytes::from(serde_json::to_vec(&manifest).unwrap());
        assert_eq!(decode_document(Some(bytes)), manifest);
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let manifest_store = MemoryManifestStore::new(store.clone());

        let manifest = Manifest::new(vec![
            entry("osrs-231_2024-05-01", 231, "2024-05-01T00:00:00Z"),
            entry("osrs-229_2024-04-01", 229, "2024-04-01T00:00:00Z"),
        ]);

        manifest_store.write(&manifest).await.unwrap();
        assert_eq!(manifest_store.read().await, manifest);

        // cache-disabling metadata on the document itself
        assert_eq!(
            store.content_type(MANIFEST_KEY),
            Some("application/json".to_string())
        );
        assert_eq!(store.cache_control(MANIFEST_KEY), Some("no-cache".to_string()));
    }

    #[test]
    fn test_entry_from_descriptor() {
        let descriptor = CacheDescriptor {
            id: 1,
            scope: "runescape".to_string(),
            game: "oldschool".to_string(),
            environment: "production".to_string(),
            language: "en".to_string(),
            builds: vec![crate::catalog::BuildVersion {
                major: 231,
                minor: Some(1),
            }],
            timestamp: Some(ts("2024-05-01T00:00:00Z")),
            size: 4096,
        };

        let entry = ManifestEntry::from_descriptor(&descriptor).unwrap();
        assert_eq!(entry.name, "osrs-231_2024-05-01");
        assert_eq!(entry.build, 231);
        assert_eq!(entry.size, 4096);
    }

    #[test]
    fn test_entry_from_descriptor_without_builds_fails() {
        let descriptor = CacheDescriptor {
            id: 1,
            scope: "runescape".to_string(),
            game: "oldschool".to_string(),
            environment: "production".to_string(),
            language: "en".to_string(),
            builds: Vec::new(),
            timestamp: Some(ts("2024-05-01T00:00:00Z")),
            size: 0,
        };
        assert!(ManifestEntry::from_descriptor(&descriptor).is_err());
    }
}
