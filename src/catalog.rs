/*!
 * Upstream catalog reader
 *
 * Queries the archive's bundle listing, filters it to the configured
 * scope/game/language and orders candidates newest-first.
 */

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};

/// One (major, minor) build version pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildVersion {
    pub major: u32,
    pub minor: Option<u32>,
}

/// One bundle as described by the upstream catalog. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheDescriptor {
    /// Opaque upstream identifier
    pub id: u64,

    pub scope: String,
    pub game: String,
    pub environment: String,
    pub language: String,

    /// Build versions; the first entry is canonical
    #[serde(default)]
    pub builds: Vec<BuildVersion>,

    /// Publication timestamp; absent for incompletely indexed bundles
    pub timestamp: Option<DateTime<Utc>>,

    /// Total size in bytes
    #[serde(default)]
    pub size: u64,
}

impl CacheDescriptor {
    /// Canonical build major, if any build entry exists
    pub fn canonical_build(&self) -> Option<u32> {
        self.builds.first().map(|b| b.major)
    }
}

/// Source of publishable bundle candidates, ordered newest-first
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// List candidates matching the configured scope/game/language.
    ///
    /// An empty result is not an error; it means there is nothing to sync.
    async fn list_candidates(&self) -> Result<Vec<CacheDescriptor>>;
}

/// Does this record qualify as a candidate for the given filter?
///
/// Requires at least one build entry and a present timestamp; records without
/// either cannot be named or ordered.
pub fn is_candidate(record: &CacheDescriptor, scope: &str, game: &str, language: &str) -> bool {
    record.scope == scope
        && record.game == game
        && record.language == language
        && !record.builds.is_empty()
        && record.timestamp.is_some()
}

/// Newest-first ordering: descending canonical build major, ties broken by
/// descending timestamp. Full ties keep their original listing order (the
/// surrounding sort is stable).
pub fn compare_candidates(a: &CacheDescriptor, b: &CacheDescriptor) -> Ordering {
    b.canonical_build()
        .cmp(&a.canonical_build())
        .then_with(|| b.timestamp.cmp(&a.timestamp))
}

/// Catalog reader backed by the archive's HTTP listing endpoint
pub struct HttpCatalog {
    http: reqwest::Client,
    archive_url: String,
    scope: String,
    game: String,
    language: String,
}

impl HttpCatalog {
    pub fn new(config: &MirrorConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            archive_url: config.archive_url.trim_end_matches('/').to_string(),
            scope: config.scope.clone(),
            game: config.game.clone(),
            language: config.language.clone(),
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn list_candidates(&self) -> Result<Vec<CacheDescriptor>> {
        let url = format!("{}/caches.json", self.archive_url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MirrorError::Upstream(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(MirrorError::Upstream(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        let records: Vec<CacheDescriptor> = response
            .json()
            .await
            .map_err(|e| MirrorError::Upstream(format!("{}: {}", url, e)))?;

        let total = records.len();
        let mut candidates: Vec<CacheDescriptor> = records
            .into_iter()
            .filter(|r| is_candidate(r, &self.scope, &self.game, &self.language))
            .collect();
        candidates.sort_by(compare_candidates);

        debug!(
            total,
            matching = candidates.len(),
            scope = %self.scope,
            game = %self.game,
            "listed upstream catalog"
        );

        Ok(candidates)
    }
}
