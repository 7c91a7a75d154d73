/*!
 * Retention pruner: removes bundles past the retention bound
 *
 * The manifest arrives sorted newest-first, so retention is a split: keep
 * the first `keep` entries, delete the storage prefixes of the rest.
 * Deletion failures are collected per bundle and reported, never swallowed.
 */

use tracing::{info, warn};

use crate::manifest::{Manifest, ManifestEntry};
use crate::storage::{RemoteStore, StorageError};

/// A bundle whose storage objects could not all be deleted
#[derive(Debug)]
pub struct PruneFailure {
    pub name: String,
    pub error: StorageError,
}

/// Result of one retention pass
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Entries removed from the manifest, newest-first
    pub removed: Vec<ManifestEntry>,

    /// Bundles whose deletion failed; the manifest no longer lists them
    pub failures: Vec<PruneFailure>,
}

impl PruneReport {
    pub fn removed_names(&self) -> Vec<String> {
        self.removed.iter().map(|e| e.name.clone()).collect()
    }
}

/// Applies the retention bound to a manifest and deletes pruned bundles
pub struct RetentionPruner<'a> {
    store: &'a dyn RemoteStore,
    keep: usize,
}

impl<'a> RetentionPruner<'a> {
    pub fn new(store: &'a dyn RemoteStore, keep: usize) -> Self {
        Self { store, keep }
    }

    /// Truncate `manifest` to the retention bound and delete every storage
    /// object under each removed entry's prefix.
    ///
    /// Deletion is best-effort per entry: one bundle failing does not stop
    /// the others, but each failure ends up in the report.
    pub async fn prune(&self, manifest: &mut Manifest) -> PruneReport {
        let removed = manifest.truncate_to(self.keep);
        if removed.is_empty() {
            return PruneReport::default();
        }

        let mut failures = Vec::new();
        for entry in &removed {
            match self.delete_bundle(entry).await {
                Ok(deleted) => {
                    info!(name = %entry.name, objects = deleted, "pruned bundle");
                }
                Err(error) => {
                    warn!(name = %entry.name, error = %error, "failed to delete pruned bundle");
                    failures.push(PruneFailure {
                        name: entry.name.clone(),
                        error,
                    });
                }
            }
        }

        PruneReport { removed, failures }
    }

    /// Delete every object under the bundle's prefix, paginating through
    /// listing results until exhausted
    async fn delete_bundle(&self, entry: &ManifestEntry) -> Result<usize, StorageError> {
        let prefix = format!("{}/", entry.storage_prefix());
        let mut deleted = 0;
        let mut continuation = None;

        loop {
            let page = self.store.list(&prefix, continuation).await?;
            if !page.keys.is_empty() {
                deleted += page.keys.len();
                self.store.delete_all(&page.keys).await?;
            }
            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(deleted)
    }
}
