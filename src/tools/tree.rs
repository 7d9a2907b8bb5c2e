//! Directory tree report over a storage prefix

use crate::error::Result;
use crate::storage::ObjectStore;
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct TreeNode {
    /// Files directly inside this directory
    direct: usize,
    /// Files anywhere below this directory
    total: usize,
    children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn child(&mut self, name: &str) -> &mut TreeNode {
        self.children.entry(name.to_string()).or_default()
    }

    fn compute_totals(&mut self) -> usize {
        let below: usize = self.children.values_mut().map(TreeNode::compute_totals).sum();
        self.total = self.direct + below;
        self.total
    }

    fn render_children(&self, prefix: &str, out: &mut String) {
        let count = self.children.len();
        for (index, (name, child)) in self.children.iter().enumerate() {
            let is_last = index + 1 == count;
            let connector = if is_last { "└── " } else { "├── " };
            let mut info = format!("[Total: {}]", child.total);
            if child.direct > 0 {
                let _ = write!(info, " (Direct: {})", child.direct);
            }
            let _ = writeln!(out, "{prefix}{connector}{name}/ {info}");

            let extension = if is_last { "    " } else { "│   " };
            child.render_children(&format!("{prefix}{extension}"), out);
        }
    }
}

/// Keys under a prefix folded into directories with recursive file counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTree {
    prefix: String,
    root: TreeNode,
}

impl PrefixTree {
    /// Fold `keys` into a tree rooted at `prefix`.
    ///
    /// Keys outside the prefix are ignored. Keys ending in `/` are directory
    /// placeholders: they create directories but count as no file.
    pub fn from_keys<I, S>(prefix: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = TreeNode::default();
        for key in keys {
            let key = key.as_ref();
            let Some(relative) = key.strip_prefix(prefix) else {
                continue;
            };
            if relative.is_empty() {
                continue;
            }

            let mut parts: Vec<&str> = relative.split('/').collect();
            let file = parts.pop();
            let mut node = &mut root;
            for part in parts {
                node = node.child(part);
            }
            if file.is_some_and(|name| !name.is_empty()) {
                node.direct += 1;
            }
        }
        root.compute_totals();

        Self {
            prefix: prefix.to_string(),
            root,
        }
    }

    pub fn total_files(&self) -> usize {
        self.root.total
    }

    /// Text report with connectors, children sorted by name
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Total Files Found: {}", self.root.total);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} (Total: {}, Direct: {})",
            self.prefix, self.root.total, self.root.direct
        );
        self.root.render_children("", &mut out);
        out
    }
}

/// List everything under `prefix` and fold it into a tree
///
/// # Errors
/// - The listing fails
pub async fn scan_prefix_tree(store: &dyn ObjectStore, prefix: &str) -> Result<PrefixTree> {
    let keys = store.list(prefix).await?;
    tracing::debug!(prefix = %prefix, count = keys.len(), "Listed prefix for tree report");
    Ok(PrefixTree::from_keys(prefix, keys))
}
