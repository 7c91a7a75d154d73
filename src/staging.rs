/*!
 * Local staging root for one bundle's download/extract phase
 */

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Exclusively owned staging directory, removed on drop.
///
/// Creation removes any pre-existing directory at the same path, so leftovers
/// from a crashed prior run never leak into this one. Removal on drop runs on
/// every exit path, including `?` early-returns.
#[derive(Debug)]
pub struct StagingRoot {
    path: PathBuf,
}

impl StagingRoot {
    /// Create a fresh, empty staging root at `path`
    pub fn create(path: &Path) -> io::Result<Self> {
        if path.exists() {
            debug!(path = %path.display(), "removing stale staging root");
            fs::remove_dir_all(path)?;
        }
        fs::create_dir_all(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingRoot {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove staging root");
            }
        }
    }
}
