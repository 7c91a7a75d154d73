/*!
 * Runtime configuration for cache-mirror
 *
 * One explicit configuration value is built at process start and passed into
 * the components that need it; there is no ambient global state.
 */

use std::env;
use std::path::PathBuf;

use crate::error::{MirrorError, Result};

/// Default bucket name when none is configured
pub const DEFAULT_BUCKET: &str = "cache";

/// Default upstream archive base URL
pub const DEFAULT_ARCHIVE_URL: &str = "https://archive.openrs2.org";

/// Default number of bundles kept published simultaneously
pub const DEFAULT_KEEP: usize = 5;

/// Catalog scope this mirror tracks
pub const DEFAULT_SCOPE: &str = "runescape";

/// Game this mirror tracks (the primary game, see `manifest::derive_name`)
pub const DEFAULT_GAME: &str = "oldschool";

/// Language this mirror tracks
pub const DEFAULT_LANGUAGE: &str = "en";

/// Runtime configuration for one sync cycle
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Storage account id (forms the S3 endpoint URL)
    pub account_id: String,

    /// Access key id for the storage account
    pub access_key_id: String,

    /// Secret access key for the storage account
    pub secret_access_key: String,

    /// Bucket the mirror publishes into
    pub bucket: String,

    /// Explicit S3 endpoint override; derived from the account id when unset
    pub endpoint: Option<String>,

    /// Public HTTP base URL of the bucket, used for manifest reads;
    /// derived from the endpoint and bucket when unset
    pub public_url: Option<String>,

    /// Upstream archive base URL
    pub archive_url: String,

    /// Catalog scope filter
    pub scope: String,

    /// Catalog game filter
    pub game: String,

    /// Catalog language filter
    pub language: String,

    /// Retention bound: bundles kept after each successful publish
    pub keep: usize,

    /// Local staging root for one bundle's download/extract phase
    pub staging_dir: PathBuf,

    /// Verbose (debug-level) logging
    pub verbose: bool,

    /// Optional log file (JSON lines); stdout when unset
    pub log_file: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket: DEFAULT_BUCKET.to_string(),
            endpoint: None,
            public_url: None,
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            game: DEFAULT_GAME.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            keep: DEFAULT_KEEP,
            staging_dir: env::temp_dir().join("cache-mirror-staging"),
            verbose: false,
            log_file: None,
        }
    }
}

impl MirrorConfig {
    /// Validate credentials before any network call is made
    pub fn validate(&self) -> Result<()> {
        if self.account_id.is_empty() {
            return Err(MirrorError::Config("storage account id not set".into()));
        }
        if self.access_key_id.is_empty() {
            return Err(MirrorError::Config("access key id not set".into()));
        }
        if self.secret_access_key.is_empty() {
            return Err(MirrorError::Config("secret access key not set".into()));
        }
        if self.keep == 0 {
            return Err(MirrorError::Config("retention keep count must be >= 1".into()));
        }
        Ok(())
    }

    /// S3 endpoint URL, derived from the account id unless overridden
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.r2.cloudflarestorage.com", self.account_id),
        }
    }

    /// Public base URL for manifest reads, derived unless overridden
    pub fn public_base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/{}", self.endpoint_url(), self.bucket),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> MirrorConfig {
        MirrorConfig {
            account_id: "acct".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_credentials() {
        let config = MirrorConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, MirrorError::Config(_)));

        let config = MirrorConfig {
            secret_access_key: String::new(),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_keep() {
        let config = MirrorConfig {
            keep: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_derived_from_account() {
        let config = valid_config();
        assert_eq!(
            config.endpoint_url(),
            "https://acct.r2.cloudflarestorage.com"
        );
    }

    #[test]
    fn test_endpoint_override_trims_slash() {
        let config = MirrorConfig {
            endpoint: Some("http://localhost:9000/".to_string()),
            ..valid_config()
        };
        assert_eq!(config.endpoint_url(), "http://localhost:9000");
    }

    #[test]
    fn test_public_base_url_derivation() {
        let config = valid_config();
        assert_eq!(
            config.public_base_url(),
            "https://acct.r2.cloudflarestorage.com/cache"
        );

        let config = MirrorConfig {
            public_url: Some("https://cache.example.net/".to_string()),
            ..valid_config()
        };
        assert_eq!(config.public_base_url(), "https://cache.example.net");
    }
}
