//! Resume index: the set of outputs that already exist when a run starts

use crate::storage::ObjectStore;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// Keys present under the scanned prefixes at startup.
///
/// Built once and never refreshed during the run.
#[derive(Debug, Clone, Default)]
pub struct ResumeIndex {
    keys: HashSet<String>,
}

impl ResumeIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// List every prefix and collect the returned keys verbatim.
    ///
    /// Prefixes are listed concurrently. A prefix that cannot be listed is
    /// treated as holding nothing, so its work gets redone rather than
    /// skipped.
    #[instrument(skip_all, fields(prefix_count = prefixes.len()))]
    pub async fn build(store: &dyn ObjectStore, prefixes: &[String]) -> Self {
        let listings =
            futures::future::join_all(prefixes.iter().map(|prefix| store.list(prefix))).await;

        let mut keys = HashSet::new();
        for (prefix, listing) in prefixes.iter().zip(listings) {
            match listing {
                Ok(found) => keys.extend(found),
                Err(e) => warn!(
                    prefix = %prefix,
                    error = %e,
                    "⚠️  Could not list existing outputs, assuming none"
                ),
            }
        }

        info!(existing = keys.len(), "Resume index built");
        Self { keys }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    #[tokio::test]
    async fn test_build_collects_all_prefixes() {
        let store = MemoryObjectStore::new();
        store.insert("edited_images/easy/female/1_partition_0_0.png", vec![1]);
        store.insert("edited_images/hard/female/2_partition_0_0.png", vec![1]);
        store.insert("edited_images/hard/male/3_partition_0_0.png", vec![1]);

        let prefixes = vec![
            "edited_images/easy/female/".to_string(),
            "edited_images/hard/female/".to_string(),
        ];
        let index = ResumeIndex::build(&store, &prefixes).await;

        assert_eq!(index.len(), 2);
        assert!(index.contains("edited_images/easy/female/1_partition_0_0.png"));
        assert!(!index.contains("edited_images/hard/male/3_partition_0_0.png"));
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_absent_prefix_is_empty() {
        let store = MemoryObjectStore::new();
        let index = ResumeIndex::build(&store, &["nothing/here/".to_string()]).await;
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_listing_errors_fail_open() {
        let store = MemoryObjectStore::new().with_failing_list();
        store.insert("edited_images/easy/female/1.png", vec![1]);
        let index = ResumeIndex::build(&store, &["edited_images/".to_string()]).await;
        assert!(index.is_empty());
    }

    #[test]
    fn test_from_keys() {
        let index = ResumeIndex::from_keys(["a", "b"]);
        assert!(index.contains("a"));
        assert!(!index.contains("c"));
        assert!(ResumeIndex::empty().is_empty());
    }
}
