//! Typed work filter
//!
//! One predicate over parsed [`WorkItem`] fields, used both to narrow the
//! storage prefixes that get listed and to re-check every parsed item.

use crate::keys::{dir_prefix, join_key, Category, Group, WorkItem};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Filter over category, group and partition. `None` admits every value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkFilter {
    pub category: Option<Category>,
    pub group: Option<Group>,
    /// Exact partition label, e.g. `partition_3`
    pub partition: Option<String>,
}

impl WorkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: Group) -> Self {
        self.group = Some(group);
        self
    }

    #[must_use]
    pub fn with_partition<S: Into<String>>(mut self, partition: S) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Whether a parsed item satisfies every configured axis
    pub fn matches(&self, item: &WorkItem) -> bool {
        self.category.map_or(true, |category| item.category == category)
            && self.group.map_or(true, |group| item.group == group)
            && self
                .partition
                .as_deref()
                .map_or(true, |partition| item.partition == partition)
    }

    /// Groups this filter admits
    pub fn groups(&self) -> Vec<Group> {
        match self.group {
            Some(group) => vec![group],
            None => Group::ALL.to_vec(),
        }
    }

    /// Most specific listing prefixes under `root`.
    ///
    /// `group_segment` renders the group directory name (it differs between
    /// the prompt tree and the image trees) and `leaf` is appended below it
    /// when both category and group are known.
    ///
    /// - category + group: `root/{category}/{group}/{leaf}`
    /// - category only: `root/{category}/`
    /// - group only: one `root/{category}/{group}/{leaf}` per category
    /// - neither: `root/`
    pub fn scan_prefixes<F>(&self, root: &str, group_segment: F, leaf: &str) -> Vec<String>
    where
        F: Fn(Group) -> String,
    {
        let grouped = |category: Category, group: Group| {
            let mut relative = format!("{category}/{}", group_segment(group));
            if !leaf.is_empty() {
                relative = format!("{relative}/{}", leaf.trim_matches('/'));
            }
            dir_prefix(&join_key(root, &relative))
        };

        match (self.category, self.group) {
            (Some(category), Some(group)) => vec![grouped(category, group)],
            (Some(category), None) => vec![dir_prefix(&join_key(root, category.as_str()))],
            (None, Some(group)) => Category::ALL
                .into_iter()
                .map(|category| grouped(category, group))
                .collect(),
            (None, None) => vec![dir_prefix(root)],
        }
    }

    /// `{category}_{group}_{partition}` with `all` for absent axes
    pub fn label(&self) -> String {
        format!(
            "{}_{}_{}",
            self.category.map_or("all", Category::as_str),
            self.group.map_or("all", Group::as_str),
            self.partition.as_deref().unwrap_or("all")
        )
    }
}

impl fmt::Display for WorkFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "category={} group={} partition={}",
            self.category.map_or("*", Category::as_str),
            self.group.map_or("*", Group::as_str),
            self.partition.as_deref().unwrap_or("*")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: Category, group: Group, partition: &str) -> WorkItem {
        WorkItem {
            category,
            group,
            partition: partition.to_string(),
            subject_id: "1".to_string(),
            variant_suffix: "0".to_string(),
            source_key: "k".to_string(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = WorkFilter::new();
        assert!(filter.matches(&item(Category::Easy, Group::Female, "partition_0")));
        assert!(filter.matches(&item(Category::Hard, Group::Male, "unknown")));
    }

    #[test]
    fn test_filters_combine_with_and() {
        let filter = WorkFilter::new()
            .with_category(Category::Hard)
            .with_group(Group::Male);
        assert!(filter.matches(&item(Category::Hard, Group::Male, "partition_2")));
        assert!(!filter.matches(&item(Category::Hard, Group::Female, "partition_2")));
        assert!(!filter.matches(&item(Category::Easy, Group::Male, "partition_2")));
    }

    #[test]
    fn test_partition_is_exact() {
        let filter = WorkFilter::new().with_partition("partition_1");
        assert!(filter.matches(&item(Category::Easy, Group::Female, "partition_1")));
        assert!(!filter.matches(&item(Category::Easy, Group::Female, "partition_10")));
    }

    #[test]
    fn test_scan_prefixes_narrow_by_specificity() {
        let segment = |group: Group| format!("edit_{group}");

        let both = WorkFilter::new()
            .with_category(Category::Hard)
            .with_group(Group::Male);
        assert_eq!(
            both.scan_prefixes("dataset/edit_prompts", segment, ""),
            vec!["dataset/edit_prompts/hard/edit_male/"]
        );

        let category_only = WorkFilter::new().with_category(Category::Medium);
        assert_eq!(
            category_only.scan_prefixes("edited_images", |g| g.to_string(), ""),
            vec!["edited_images/medium/"]
        );

        let group_only = WorkFilter::new().with_group(Group::Female);
        assert_eq!(
            group_only.scan_prefixes("dataset_ultimate", |g| g.to_string(), "try_on_image"),
            vec![
                "dataset_ultimate/easy/female/try_on_image/",
                "dataset_ultimate/medium/female/try_on_image/",
                "dataset_ultimate/hard/female/try_on_image/",
            ]
        );

        assert_eq!(
            WorkFilter::new().scan_prefixes("edited_images/", |g| g.to_string(), ""),
            vec!["edited_images/"]
        );
    }

    #[test]
    fn test_label() {
        assert_eq!(WorkFilter::new().label(), "all_all_all");
        let filter = WorkFilter::new()
            .with_category(Category::Easy)
            .with_group(Group::Female)
            .with_partition("partition_0");
        assert_eq!(filter.label(), "easy_female_partition_0");
    }
}
