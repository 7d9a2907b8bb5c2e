//! Candidate enumeration: list, parse and filter the keys a job could process

use crate::filter::WorkFilter;
use crate::jobs::Job;
use crate::keys;
use crate::storage::ObjectStore;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

/// List every candidate prefix of `job` and keep the keys that carry the
/// job's source extension, parse as work items and match `filter`.
///
/// Keys come back sorted and de-duplicated. A prefix that cannot be listed
/// contributes nothing.
#[instrument(skip_all, fields(job = job.name(), filter = %filter))]
pub async fn enumerate_candidates<J>(store: &dyn ObjectStore, job: &J, filter: &WorkFilter) -> Vec<String>
where
    J: Job + ?Sized,
{
    let prefixes = job.candidate_prefixes(filter);
    let listings =
        futures::future::join_all(prefixes.iter().map(|prefix| store.list(prefix))).await;

    let mut listed = BTreeSet::new();
    for (prefix, listing) in prefixes.iter().zip(listings) {
        match listing {
            Ok(found) => {
                debug!(prefix = %prefix, count = found.len(), "Listed candidates");
                listed.extend(found);
            },
            Err(e) => warn!(prefix = %prefix, error = %e, "⚠️  Could not list candidates"),
        }
    }

    let extension = job.source_extension();
    let candidates: Vec<String> = listed
        .into_iter()
        .filter(|key| keys::has_extension(key, extension))
        .filter(|key| job.parse(key).is_some_and(|item| filter.matches(&item)))
        .collect();

    info!(count = candidates.len(), "🔎 Candidates enumerated");
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyLayout;
    use crate::jobs::EditJob;
    use crate::keys::{Category, Group};
    use crate::storage::MemoryObjectStore;

    fn store() -> MemoryObjectStore {
        let store = MemoryObjectStore::new();
        for key in [
            "dataset/edit_prompts/easy/edit_female/partition_0/1_0.txt",
            "dataset/edit_prompts/easy/edit_female/partition_1/2_0.txt",
            "dataset/edit_prompts/easy/edit_female/partition_0/notes.md",
            "dataset/edit_prompts/hard/edit_male/partition_0/3_1.txt",
            "dataset/edit_prompts/bogus/edit_male/partition_0/4_1.txt",
        ] {
            store.insert(key, b"prompt".to_vec());
        }
        store
    }

    #[tokio::test]
    async fn test_unfiltered_enumeration_drops_unparseable_keys() {
        let store = store();
        let job = EditJob::new(KeyLayout::default());
        let found = enumerate_candidates(&store, &job, &WorkFilter::new()).await;
        assert_eq!(
            found,
            vec![
                "dataset/edit_prompts/easy/edit_female/partition_0/1_0.txt",
                "dataset/edit_prompts/easy/edit_female/partition_1/2_0.txt",
                "dataset/edit_prompts/hard/edit_male/partition_0/3_1.txt",
            ]
        );
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_filter_narrows_listing_and_items() {
        let store = store();
        let job = EditJob::new(KeyLayout::default());
        let filter = WorkFilter::new()
            .with_category(Category::Easy)
            .with_group(Group::Female)
            .with_partition("partition_1");
        let found = enumerate_candidates(&store, &job, &filter).await;
        assert_eq!(found, vec!["dataset/edit_prompts/easy/edit_female/partition_1/2_0.txt"]);
    }

    #[tokio::test]
    async fn test_listing_failure_yields_nothing() {
        let store = store().with_failing_list();
        let job = EditJob::new(KeyLayout::default());
        assert!(enumerate_candidates(&store, &job, &WorkFilter::new()).await.is_empty());
    }
}
