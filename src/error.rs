/*!
 * Error types for cache-mirror
 */

use thiserror::Error;

use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, MirrorError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Errors that abort a sync cycle.
///
/// Soft manifest-read failures are deliberately absent: the manifest store
/// maps them to an empty manifest and logs a warning instead (first-run
/// bootstrap leniency, see [`crate::manifest`]).
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Missing or invalid configuration (pre-flight, before any network call)
    #[error("configuration error: {0}")]
    Config(String),

    /// Upstream catalog could not be retrieved or parsed
    #[error("upstream catalog unavailable: {0}")]
    Upstream(String),

    /// Bundle archive or key table download failed
    #[error("download failed: {0}")]
    Download(String),

    /// Bundle archive could not be extracted
    #[error("archive extraction failed: {0}")]
    Extraction(String),

    /// Upload of staged bundle contents failed
    #[error("publish failed: {0}")]
    Publish(String),

    /// Retention deletion failed for one or more pruned bundles
    #[error("retention deletion failed: {0}")]
    Deletion(String),

    /// Object storage error outside publish/deletion (manifest write etc.)
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error (staging directory, local files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MirrorError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MirrorError::Config(_) => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }
}
