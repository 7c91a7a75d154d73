/*!
 * cache-mirror - keeps an object-storage bucket in step with the newest
 * published game cache bundle from the upstream archive.
 *
 * One invocation runs one sync cycle:
 * - read the published manifest (the authoritative "what's live" record)
 * - pick the newest upstream candidate and skip out if it is already live
 * - stage, upload, merge into the manifest, prune old bundles, commit
 *
 * The manifest write is the commit point: nothing is considered published
 * until the manifest object reflects it.
 */

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod manifest;
pub mod publish;
pub mod retention;
pub mod staging;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use catalog::{CacheDescriptor, CatalogSource, HttpCatalog};
pub use config::MirrorConfig;
pub use error::{MirrorError, Result, EXIT_CONFIG, EXIT_FAILURE, EXIT_SUCCESS};
pub use fetch::{BundleFetcher, HttpFetcher};
pub use manifest::{Manifest, ManifestEntry, ManifestStore, PublicManifestStore};
pub use storage::{MemoryStore, RemoteStore, S3Store};
pub use sync::{run_cycle, SyncOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
