//! Object storage abstraction
//!
//! The pipeline only needs four capabilities from a blob store: list by
//! prefix, get, put and head. [`S3ObjectStore`] talks to S3 or any
//! S3-compatible service, [`MemoryObjectStore`] backs the tests.

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use crate::error::Result;
use async_trait::async_trait;

/// Content type for PNG uploads
pub const PNG_CONTENT_TYPE: &str = "image/png";
/// Content type for JSON-lines manifests
pub const JSONL_CONTENT_TYPE: &str = "application/x-ndjson";

/// Capability wrapper around a remote key/value blob store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket (or namespace) this store addresses
    fn bucket(&self) -> &str;

    /// List every key under `prefix`, following pagination to the end.
    ///
    /// An absent prefix yields an empty list.
    ///
    /// # Errors
    /// - Transport or permission failures
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Fetch an object body. `Ok(None)` when the key does not exist.
    ///
    /// # Errors
    /// - Transport failures or an unreadable body
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store an object body under `key`, replacing any previous value
    ///
    /// # Errors
    /// - Transport or permission failures
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Existence check
    ///
    /// # Errors
    /// - Failures other than "not found"
    async fn head(&self, key: &str) -> Result<bool>;

    /// Fetch an object as UTF-8 text with surrounding whitespace removed.
    ///
    /// Missing objects, invalid UTF-8 and blank text all yield `Ok(None)`.
    ///
    /// # Errors
    /// - Same as [`ObjectStore::get`]
    async fn get_text(&self, key: &str) -> Result<Option<String>> {
        let Some(bytes) = self.get(key).await? else {
            return Ok(None);
        };
        match String::from_utf8(bytes) {
            Ok(text) => {
                let trimmed = text.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            },
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Object is not valid UTF-8 text");
                Ok(None)
            },
        }
    }

    /// Public URI of `key`: `s3://{bucket}/{key}`
    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket(), key)
    }

    /// Inverse of [`ObjectStore::uri`] for URIs in this bucket
    fn key_from_uri(&self, uri: &str) -> Option<String> {
        uri.strip_prefix("s3://")?
            .strip_prefix(self.bucket())?
            .strip_prefix('/')
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}
