/*!
 * Publisher: uploads a staged directory into storage under a bundle prefix
 *
 * The upload is naturally idempotent: re-running it writes identical keys
 * with identical content, so a crash mid-upload is retried by re-running the
 * whole publish step.
 */

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{MirrorError, Result};
use crate::storage::{PutOptions, RemoteStore};

/// List every file under `root` as (relative path, absolute path) pairs,
/// sorted by relative path for deterministic upload order
pub fn walk_files(root: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| MirrorError::Publish(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| MirrorError::Publish(e.to_string()))?
            .to_path_buf();
        files.push((relative, entry.path().to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Content type for an uploaded file, guessed from its extension
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

/// Storage key for a relative path under a prefix; separators normalized
/// to `/` regardless of platform
fn key_for(prefix: &str, relative: &Path) -> String {
    let relative = relative.to_string_lossy().replace('\\', "/");
    format!("{}/{}", prefix.trim_end_matches('/'), relative)
}

/// Recursively upload every file under `local_dir` to `remote_prefix`,
/// mirroring relative paths
pub async fn publish_dir(
    store: &dyn RemoteStore,
    local_dir: &Path,
    remote_prefix: &str,
) -> Result<usize> {
    let files = walk_files(local_dir)?;

    for (relative, absolute) in &files {
        let key = key_for(remote_prefix, relative);
        let body = tokio::fs::read(absolute).await?;
        let options = PutOptions::new(content_type_for(relative));

        debug!(key = %key, bytes = body.len(), "uploading object");
        store
            .put(&key, Bytes::from(body), &options)
            .await
            .map_err(|e| MirrorError::Publish(format!("{}: {}", key, e)))?;
    }

    info!(prefix = %remote_prefix, files = files.len(), "published staged bundle");
    Ok(files.len())
}
