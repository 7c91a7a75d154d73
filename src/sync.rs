/*!
 * Sync orchestrator: one end-to-end decision/publish/prune/commit cycle
 *
 * Sequence: read manifest -> list upstream -> decide -> stage -> upload ->
 * merge -> prune -> commit. Any failure aborts the run; the staging root is
 * removed on every exit path. The manifest write at the end is the only
 * externally visible commit, so a failure before it leaves the published
 * state untouched (modulo harmless unreferenced uploads).
 */

use tracing::info;

use crate::catalog::CatalogSource;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::fetch::BundleFetcher;
use crate::manifest::{Manifest, ManifestEntry, ManifestStore};
use crate::publish::publish_dir;
use crate::retention::RetentionPruner;
use crate::staging::StagingRoot;
use crate::storage::RemoteStore;

/// Terminal state of a successful sync cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to do: no candidates, or the newest is already published
    NoOp,

    /// A new bundle went live
    Published {
        name: String,
        pruned: Vec<String>,
    },
}

/// Should this candidate be published, or is it already live?
pub fn should_publish(manifest: &Manifest, candidate_name: &str) -> bool {
    !manifest.contains_name(candidate_name)
}

/// Run one full sync cycle.
///
/// Re-running after a crash before the commit re-downloads and re-uploads
/// (wasteful but correct, uploads are idempotent); re-running after a
/// successful commit is a no-op because the derived name is already present.
pub async fn run_cycle(
    config: &MirrorConfig,
    catalog: &dyn CatalogSource,
    fetcher: &dyn BundleFetcher,
    store: &dyn RemoteStore,
    manifest_store: &dyn ManifestStore,
) -> Result<SyncOutcome> {
    let mut manifest = manifest_store.read().await;
    let candidates = catalog.list_candidates().await?;

    let Some(newest) = candidates.first() else {
        info!("no publishable candidates upstream");
        return Ok(SyncOutcome::NoOp);
    };

    let entry = ManifestEntry::from_descriptor(newest)?;
    if !should_publish(&manifest, &entry.name) {
        info!(name = %entry.name, "newest bundle already published");
        return Ok(SyncOutcome::NoOp);
    }

    info!(name = %entry.name, build = entry.build, "publishing new bundle");

    // Staging root is removed when this value drops, on success and failure
    let staging = StagingRoot::create(&config.staging_dir)?;
    fetcher.fetch(newest, staging.path()).await?;
    publish_dir(store, staging.path(), &entry.storage_prefix()).await?;

    let name = entry.name.clone();
    manifest.merge(entry);

    let pruner = RetentionPruner::new(store, config.keep);
    let report = pruner.prune(&mut manifest).await;

    // Commit point. The truncated manifest is written even when a pruned
    // bundle's deletion failed: the manifest must not keep referencing a
    // half-deleted bundle, and orphaned-but-unlisted objects are harmless.
    manifest_store.write(&manifest).await?;
    info!(name = %name, retained = manifest.len(), "manifest committed");

    if !report.failures.is_empty() {
        let summary: Vec<String> = report
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.name, f.error))
            .collect();
        return Err(MirrorError::Deletion(summary.join("; ")));
    }

    Ok(SyncOutcome::Published {
        name,
        pruned: report.removed_names(),
    })
}
