//! Maintenance tools that sit beside the pipeline

pub mod scripts;
pub mod tree;

pub use scripts::{generate_scripts, ScriptDriver, DEFAULT_VTON_PARTITIONS};
pub use tree::{scan_prefix_tree, PrefixTree};
