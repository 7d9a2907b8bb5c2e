//! In-memory object store for tests and dry runs

use super::ObjectStore;
use crate::error::{ForgeError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: Option<String>,
}

#[derive(Debug, Default)]
struct CallCounters {
    list: AtomicUsize,
    put: AtomicUsize,
}

/// Blob store held in a sorted map, with call counters and fault injection.
///
/// Cloning shares the same underlying objects.
#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    counters: Arc<CallCounters>,
    get_log: Arc<Mutex<Vec<String>>>,
    list_log: Arc<Mutex<Vec<String>>>,
    put_delay: Option<Duration>,
    failing_put_patterns: Arc<Mutex<HashSet<String>>>,
    failing_list: bool,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::with_bucket("memory")
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket<S: Into<String>>(bucket: S) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            counters: Arc::new(CallCounters::default()),
            get_log: Arc::new(Mutex::new(Vec::new())),
            list_log: Arc::new(Mutex::new(Vec::new())),
            put_delay: None,
            failing_put_patterns: Arc::new(Mutex::new(HashSet::new())),
            failing_list: false,
        }
    }

    /// Delay every put by `delay` before it lands
    #[must_use]
    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }

    /// Make every `list` call fail
    #[must_use]
    pub fn with_failing_list(mut self) -> Self {
        self.failing_list = true;
        self
    }

    /// Fail puts whose key contains `pattern`
    pub fn fail_puts_matching<S: Into<String>>(&self, pattern: S) {
        self.failing_put_patterns
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(pattern.into());
    }

    /// Seed an object directly, bypassing counters
    pub fn insert<K: Into<String>>(&self, key: K, body: Vec<u8>) {
        self.objects().insert(
            key.into(),
            StoredObject {
                body,
                content_type: None,
            },
        );
    }

    /// Current body of `key`
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects().get(key).map(|o| o.body.clone())
    }

    /// Content type recorded by the last put of `key`
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects().get(key).and_then(|o| o.content_type.clone())
    }

    /// All stored keys in lexicographic order
    pub fn keys(&self) -> Vec<String> {
        self.objects().keys().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.counters.list.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.counters.put.load(Ordering::SeqCst)
    }

    /// Keys requested through `get`, in call order
    pub fn get_log(&self) -> Vec<String> {
        self.get_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Prefixes passed to `list`, in call order
    pub fn list_log(&self) -> Vec<String> {
        self.list_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn put_should_fail(&self, key: &str) -> bool {
        self.failing_put_patterns
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .any(|pattern| key.contains(pattern.as_str()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        self.list_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(prefix.to_string());
        if self.failing_list {
            return Err(ForgeError::storage_op_error("list", prefix, "injected failure"));
        }
        Ok(self
            .objects()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(key.to_string());
        tokio::task::yield_now().await;
        Ok(self.object(key))
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        self.counters.put.fetch_add(1, Ordering::SeqCst);
        if self.put_should_fail(key) {
            return Err(ForgeError::storage_op_error("put", key, "injected failure"));
        }
        self.objects().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: Some(content_type.to_string()),
            },
        );
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<bool> {
        Ok(self.objects().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_prefix_scoped() {
        let store = MemoryObjectStore::new();
        store.insert("a/b/1.png", vec![1]);
        store.insert("a/b/2.png", vec![2]);
        store.insert("a/c/3.png", vec![3]);
        store.insert("ab/4.png", vec![4]);

        let keys = store.list("a/b/").await.unwrap();
        assert_eq!(keys, vec!["a/b/1.png", "a/b/2.png"]);
        assert!(store.list("zzz/").await.unwrap().is_empty());
        assert_eq!(store.list_calls(), 2);
        assert_eq!(store.list_log(), vec!["a/b/", "zzz/"]);
    }

    #[tokio::test]
    async fn test_put_get_head() {
        let store = MemoryObjectStore::new();
        assert!(!store.head("x.png").await.unwrap());
        store.put("x.png", vec![9, 9], "image/png").await.unwrap();
        assert!(store.head("x.png").await.unwrap());
        assert_eq!(store.get("x.png").await.unwrap(), Some(vec![9, 9]));
        assert_eq!(store.content_type("x.png").as_deref(), Some("image/png"));
        assert_eq!(store.get("missing.png").await.unwrap(), None);
        assert_eq!(store.get_log(), vec!["x.png", "missing.png"]);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryObjectStore::new().with_failing_list();
        assert!(store.list("a/").await.is_err());

        store.fail_puts_matching("cloth_image");
        assert!(store.put("out/cloth_image/a.png", vec![], "image/png").await.is_err());
        assert!(store.put("out/try_on_image/a.png", vec![], "image/png").await.is_ok());
        assert_eq!(store.put_calls(), 2);
        assert_eq!(store.keys(), vec!["out/try_on_image/a.png"]);
    }
}
