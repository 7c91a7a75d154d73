/*!
 * Bundle fetcher: downloads a selected bundle into the staging root
 *
 * A staged bundle holds the extracted archive contents, a rewritten
 * per-group key table (`keys.json`) and the serialized descriptor
 * (`info.json`). Partial staging on failure is fine; the orchestrator
 * removes the whole staging root on any error.
 */

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info};

use crate::catalog::CacheDescriptor;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};

/// One upstream decryption key record
#[derive(Debug, Clone, Deserialize)]
pub struct GroupKey {
    pub group: u32,
    pub key: String,
}

/// Retrieves a bundle's archive and keys into a local directory
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    /// Download and extract the bundle into `dest`, preserving internal
    /// paths, and write `keys.json` and `info.json` alongside
    async fn fetch(&self, descriptor: &CacheDescriptor, dest: &Path) -> Result<()>;
}

/// Fetcher backed by the archive's HTTP endpoints
pub struct HttpFetcher {
    http: reqwest::Client,
    archive_url: String,
}

impl HttpFetcher {
    pub fn new(config: &MirrorConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            archive_url: config.archive_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| MirrorError::Download(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(MirrorError::Download(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| MirrorError::Download(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl BundleFetcher for HttpFetcher {
    async fn fetch(&self, descriptor: &CacheDescriptor, dest: &Path) -> Result<()> {
        let base = format!(
            "{}/caches/{}/{}",
            self.archive_url, descriptor.scope, descriptor.id
        );

        let archive_url = format!("{}/disk.zip", base);
        info!(url = %archive_url, size = descriptor.size, "downloading bundle archive");
        let archive = self.get_bytes(&archive_url).await?;

        let dest_dir = dest.to_path_buf();
        tokio::task::spawn_blocking(move || extract_zip(archive, &dest_dir))
            .await
            .map_err(|e| MirrorError::Extraction(format!("extraction task failed: {}", e)))??;

        let keys_url = format!("{}/keys.json", base);
        debug!(url = %keys_url, "downloading key table");
        let keys: Vec<GroupKey> = serde_json::from_slice(&self.get_bytes(&keys_url).await?)
            .map_err(|e| MirrorError::Download(format!("{}: {}", keys_url, e)))?;

        tokio::fs::write(
            dest.join("keys.json"),
            serde_json::to_vec(&rewrite_keys(keys))?,
        )
        .await?;
        tokio::fs::write(dest.join("info.json"), serde_json::to_vec(descriptor)?).await?;

        Ok(())
    }
}

/// Rewrite the upstream key list into a mapping keyed by group id as string
pub fn rewrite_keys(keys: Vec<GroupKey>) -> BTreeMap<String, String> {
    keys.into_iter()
        .map(|k| (k.group.to_string(), k.key))
        .collect()
}

/// Extract a zip archive into `dest`, preserving internal paths.
///
/// Entry paths are resolved through `enclosed_name`, so entries that would
/// escape `dest` abort the extraction.
pub fn extract_zip(archive: Bytes, dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| MirrorError::Extraction(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| MirrorError::Extraction(e.to_string()))?;

        let relative: PathBuf = entry.enclosed_name().ok_or_else(|| {
            MirrorError::Extraction(format!("unsafe entry path: {}", entry.name()))
        })?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Bytes {
        let mut buffer = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
        Bytes::from(buffer.into_inner())
    }

    #[test]
    fn test_extract_preserves_internal_paths() {
        let dir = tempdir().unwrap();
        let archive = build_zip(&[
            ("cache/main_file_cache.dat2", b"dat2" as &[u8]),
            ("cache/main_file_cache.idx0", b"idx0"),
            ("readme.txt", b"hello"),
        ]);

        extract_zip(archive, dir.path()).unwrap();

        assert_eq!(
            fs::read(dir.path().join("cache/main_file_cache.dat2")).unwrap(),
            b"dat2"
        );
        assert_eq!(
            fs::read(dir.path().join("cache/main_file_cache.idx0")).unwrap(),
            b"idx0"
        );
        assert_eq!(fs::read(dir.path().join("readme.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_extract_rejects_escaping_entry() {
        let dir = tempdir().unwrap();
        let archive = build_zip(&[("../outside.dat", b"nope" as &[u8])]);

        let err = extract_zip(archive, dir.path()).unwrap_err();
        assert!(matches!(err, MirrorError::Extraction(_)));
        assert!(!dir.path().parent().unwrap().join("outside.dat").exists());
    }

    #[test]
    fn test_extract_garbage_fails() {
        let dir = tempdir().unwrap();
        let err = extract_zip(Bytes::from_static(b"not a zip"), dir.path()).unwrap_err();
        assert!(matches!(err, MirrorError::Extraction(_)));
    }

    #[test]
    fn test_rewrite_keys_groups_as_strings() {
        let keys = vec![
            GroupKey {
                group: 12,
                key: "aaaa".to_string(),
            },
            GroupKey {
                group: 3,
                key: "bbbb".to_string(),
            },
        ];

        let map = rewrite_keys(keys);
        assert_eq!(map.get("12"), Some(&"aaaa".to_string()));
        assert_eq!(map.get("3"), Some(&"bbbb".to_string()));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_group_key_deserialize() {
        let keys: Vec<GroupKey> =
            serde_json::from_str(r#"[{"group": 5, "key": "deadbeef"}]"#).unwrap();
        assert_eq!(keys[0].group, 5);
        assert_eq!(keys[0].key, "deadbeef");
    }
}
