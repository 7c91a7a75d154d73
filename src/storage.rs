/*!
 * Object storage seam
 *
 * The sync cycle only needs three storage operations: put an object, list a
 * prefix page by page, and batch-delete keys. `RemoteStore` captures exactly
 * that surface; `S3Store` implements it against S3-compatible storage and
 * `MemoryStore` is the in-process implementation the tests run against.
 */

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use thiserror::Error;

use crate::config::MirrorConfig;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors that can occur against the object store
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Object not found in bucket
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Access denied error
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Invalid configuration
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// SDK or service error
    #[error("storage service error: {0}")]
    Sdk(String),
}

/// Convert AWS SDK errors to StorageError
impl<E> From<aws_sdk_s3::error::SdkError<E>> for StorageError
where
    E: std::error::Error + 'static,
{
    fn from(error: aws_sdk_s3::error::SdkError<E>) -> Self {
        match error {
            aws_sdk_s3::error::SdkError::DispatchFailure(e) => {
                StorageError::Network(format!("dispatch failure: {:?}", e))
            }
            aws_sdk_s3::error::SdkError::ResponseError(e) => {
                StorageError::Network(format!("response error: {:?}", e))
            }
            aws_sdk_s3::error::SdkError::ServiceError(e) => {
                let err_str = format!("{:?}", e);
                if err_str.contains("AccessDenied") {
                    StorageError::AccessDenied("access denied to resource".to_string())
                } else {
                    StorageError::Sdk(err_str)
                }
            }
            _ => StorageError::Sdk(format!("{:?}", error)),
        }
    }
}

/// Per-object upload options
#[derive(Debug, Clone)]
pub struct PutOptions {
    /// Content-Type for the object
    pub content_type: String,

    /// Cache-Control for the object
    pub cache_control: Option<String>,
}

impl PutOptions {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            cache_control: None,
        }
    }

    /// JSON document that readers must always re-fetch
    pub fn json_no_cache() -> Self {
        Self {
            content_type: "application/json".to_string(),
            cache_control: Some("no-cache".to_string()),
        }
    }
}

/// One page of a prefix listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Keys in this page
    pub keys: Vec<String>,

    /// Continuation token for the next page; None when exhausted
    pub continuation: Option<String>,
}

/// Minimal object-store surface used by the sync cycle
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload an object, overwriting any existing one under the same key
    async fn put(&self, key: &str, body: Bytes, options: &PutOptions) -> StorageResult<()>;

    /// List one page of keys under a prefix
    async fn list(&self, prefix: &str, continuation: Option<String>) -> StorageResult<ListPage>;

    /// Delete a batch of keys
    async fn delete_all(&self, keys: &[String]) -> StorageResult<()>;
}

/// S3-compatible store implementation
#[derive(Clone)]
pub struct S3Store {
    client: AwsS3Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from the mirror configuration (explicit credentials,
    /// endpoint derived from the storage account id)
    pub async fn connect(config: &MirrorConfig) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::InvalidConfig("bucket name is empty".into()));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "cache-mirror",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint_url())
            .load()
            .await;

        Ok(Self {
            client: AwsS3Client::new(&aws_config),
            bucket: config.bucket.clone(),
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn put(&self, key: &str, body: Bytes, options: &PutOptions) -> StorageResult<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(&options.content_type);

        if let Some(cache_control) = &options.cache_control {
            request = request.cache_control(cache_control);
        }

        request.send().await.map_err(StorageError::from)?;
        Ok(())
    }

    async fn list(&self, prefix: &str, continuation: Option<String>) -> StorageResult<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix);

        if let Some(token) = continuation {
            request = request.continuation_token(token);
        }

        let response = request.send().await.map_err(StorageError::from)?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(|k| k.to_string()))
            .collect();
        let continuation = response.next_continuation_token().map(|t| t.to_string());

        Ok(ListPage { keys, continuation })
    }

    async fn delete_all(&self, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Sdk(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|e| StorageError::Sdk(e.to_string()))?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}

/// Call counters recorded by [`MemoryStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    pub put_calls: usize,
    pub list_calls: usize,
    pub delete_calls: usize,
    pub deleted_keys: usize,
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    content_type: String,
    cache_control: Option<String>,
}

/// In-memory store used by the test suite
///
/// Behaves like the S3 listing API: keys come back in lexicographic order,
/// `page_size` keys per page, with a continuation token while truncated.
#[derive(Debug)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    counters: Mutex<StoreCounters>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    /// Small page sizes force list pagination in tests
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            counters: Mutex::new(StoreCounters::default()),
            page_size: page_size.max(1),
        }
    }

    /// Fetch a stored object's body, if present
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .expect("store lock poisoned")
            .get(key)
            .map(|obj| obj.body.clone())
    }

    /// Fetch a stored object's content type, if present
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .expect("store lock poisoned")
            .get(key)
            .map(|obj| obj.content_type.clone())
    }

    /// Fetch a stored object's cache control, if present
    pub fn cache_control(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .expect("store lock poisoned")
            .get(key)
            .and_then(|obj| obj.cache_control.clone())
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("store lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Snapshot of the call counters
    pub fn counters(&self) -> StoreCounters {
        *self.counters.lock().expect("counter lock poisoned")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn put(&self, key: &str, body: Bytes, options: &PutOptions) -> StorageResult<()> {
        self.counters.lock().expect("counter lock poisoned").put_calls += 1;
        self.objects.lock().expect("store lock poisoned").insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: options.content_type.clone(),
                cache_control: options.cache_control.clone(),
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str, continuation: Option<String>) -> StorageResult<ListPage> {
        self.counters.lock().expect("counter lock poisoned").list_calls += 1;
        let objects = self.objects.lock().expect("store lock poisoned");

        let matching: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| match &continuation {
                Some(after) => k.as_str() > after.as_str(),
                None => true,
            })
            .cloned()
            .collect();

        let page: Vec<String> = matching.iter().take(self.page_size).cloned().collect();
        let continuation = if matching.len() > self.page_size {
            page.last().cloned()
        } else {
            None
        };

        Ok(ListPage {
            keys: page,
            continuation,
        })
    }

    async fn delete_all(&self, keys: &[String]) -> StorageResult<()> {
        let mut counters = self.counters.lock().expect("counter lock poisoned");
        counters.delete_calls += 1;
        counters.deleted_keys += keys.len();
        drop(counters);

        let mut objects = self.objects.lock().expect("store lock poisoned");
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_put_get() {
        let store = MemoryStore::new();
        store
            .put("caches/a/info.json", Bytes::from("{}"), &PutOptions::json_no_cache())
            .await
            .unwrap();

        assert_eq!(store.get("caches/a/info.json"), Some(Bytes::from("{}")));
        assert_eq!(
            store.content_type("caches/a/info.json"),
            Some("application/json".to_string())
        );
        assert_eq!(
            store.cache_control("caches/a/info.json"),
            Some("no-cache".to_string())
        );
        assert_eq!(store.counters().put_calls, 1);
    }

    #[tokio::test]
    async fn test_memory_list_pagination() {
        let store = MemoryStore::with_page_size(2);
        for key in ["p/1", "p/2", "p/3", "p/4", "p/5", "q/1"] {
            store
                .put(key, Bytes::new(), &PutOptions::new("application/octet-stream"))
                .await
                .unwrap();
        }

        let mut collected = Vec::new();
        let mut continuation = None;
        let mut pages = 0;
        loop {
            let page = store.list("p/", continuation).await.unwrap();
            pages += 1;
            collected.extend(page.keys);
            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        assert_eq!(collected, vec!["p/1", "p/2", "p/3", "p/4", "p/5"]);
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn test_memory_delete_all() {
        let store = MemoryStore::new();
        for key in ["a/1", "a/2", "b/1"] {
            store
                .put(key, Bytes::new(), &PutOptions::new("application/octet-stream"))
                .await
                .unwrap();
        }

        store
            .delete_all(&["a/1".to_string(), "a/2".to_string()])
            .await
            .unwrap();

        assert_eq!(store.keys(), vec!["b/1"]);
        assert_eq!(store.counters().delete_calls, 1);
        assert_eq!(store.counters().deleted_keys, 2);
    }

    #[test]
    fn test_put_options() {
        let options = PutOptions::new("text/plain");
        assert_eq!(options.content_type, "text/plain");
        assert!(options.cache_control.is_none());

        let options = PutOptions::json_no_cache();
        assert_eq!(options.content_type, "application/json");
        assert_eq!(options.cache_control.as_deref(), Some("no-cache"));
    }
}
