//! Storage key conventions
//!
//! Every input and output of the pipeline lives at a key derived from a fixed
//! hierarchy. Parsing is total: a key either yields exactly one [`WorkItem`]
//! or `None`, it never errors. Target keys are pure functions of a
//! `WorkItem`, which is what makes reruns skip completed work.

use crate::config::KeyLayout;
use crate::error::ForgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Partition label for keys that carry no partition marker
pub const UNKNOWN_PARTITION: &str = "unknown";
/// Variant suffix for filenames without an underscore
pub const DEFAULT_VARIANT: &str = "0";
/// Marker token that introduces a partition label
pub const PARTITION_MARKER: &str = "partition";

const PROMPT_EXTENSION: &str = "txt";
const IMAGE_EXTENSION: &str = "png";
const CLOTH_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Difficulty tier of a dataset item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Easy,
    Medium,
    Hard,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Easy, Category::Medium, Category::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Easy => "easy",
            Category::Medium => "medium",
            Category::Hard => "hard",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| ForgeError::config_value_error("category", s, "easy, medium, hard"))
    }
}

/// Subject class of a dataset item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Female,
    Male,
}

impl Group {
    pub const ALL: [Group; 2] = [Group::Female, Group::Male];

    pub fn as_str(self) -> &'static str {
        match self {
            Group::Female => "female",
            Group::Male => "male",
        }
    }

    /// Detect the group embedded in a directory token such as `edit_female`.
    ///
    /// `female` is tested first since it contains `male`.
    pub fn from_dir_token(token: &str) -> Option<Group> {
        if token.contains("female") {
            Some(Group::Female)
        } else if token.contains("male") {
            Some(Group::Male)
        } else {
            None
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Group {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Group::ALL
            .into_iter()
            .find(|group| group.as_str() == s)
            .ok_or_else(|| ForgeError::config_value_error("group", s, "female, male"))
    }
}

/// Structured descriptor parsed from one candidate key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub category: Category,
    pub group: Group,
    /// Shard label such as `partition_0`, or [`UNKNOWN_PARTITION`]
    pub partition: String,
    pub subject_id: String,
    pub variant_suffix: String,
    pub source_key: String,
}

impl WorkItem {
    /// Filename of the source key without its extension
    pub fn source_stem(&self) -> &str {
        let filename = file_name(&self.source_key);
        split_extension(filename).map_or(filename, |(stem, _)| stem)
    }
}

/// The three files that make up one try-on sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Initial,
    Cloth,
    TryOn,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Initial, ArtifactKind::Cloth, ArtifactKind::TryOn];

    /// Directory holding this artifact type
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Initial => "initial_image",
            ArtifactKind::Cloth => "cloth_image",
            ArtifactKind::TryOn => "try_on_image",
        }
    }

    /// Filename suffix for this artifact type
    pub fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Initial => "initial",
            ArtifactKind::Cloth => "cloth",
            ArtifactKind::TryOn => "try_on",
        }
    }
}

/// Join a root and relative path with exactly one separator
pub fn join_key(root: &str, rest: &str) -> String {
    let root = root.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    if root.is_empty() {
        rest.to_string()
    } else {
        format!("{root}/{rest}")
    }
}

/// Root normalized to a listing prefix ending in `/`
pub fn dir_prefix(root: &str) -> String {
    format!("{}/", root.trim_end_matches('/'))
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn split_extension(filename: &str) -> Option<(&str, &str)> {
    filename
        .rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
}

/// Whether `key` ends in `.{extension}`
pub fn has_extension(key: &str, extension: &str) -> bool {
    split_extension(file_name(key)).is_some_and(|(_, ext)| ext == extension)
}

/// Whether `key` looks like a garment image
pub fn is_cloth_image(key: &str) -> bool {
    CLOTH_EXTENSIONS
        .iter()
        .any(|extension| has_extension(key, extension))
}

fn is_partition_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Whether `label` names a partition: the marker, an optional `_` or `-`,
/// then an alphanumeric id (`partition_0`, `partition-3`, `partition12`)
pub fn is_partition_label(label: &str) -> bool {
    label
        .strip_prefix(PARTITION_MARKER)
        .is_some_and(|rest| is_partition_id(rest.strip_prefix(['_', '-']).unwrap_or(rest)))
}

/// Split the partition off the stem tokens that follow the subject id.
///
/// Edited outputs are named `{subject}_{partition}_{variant}`, and splitting
/// on `_` breaks `partition_0` into two tokens.
fn split_stem_partition<'k, 's>(rest: &'s [&'k str]) -> (String, &'s [&'k str]) {
    match rest {
        [marker, id, tail @ ..] if *marker == PARTITION_MARKER && is_partition_id(id) => {
            (format!("{PARTITION_MARKER}_{id}"), tail)
        },
        [label, tail @ ..] if is_partition_label(label) || *label == UNKNOWN_PARTITION => {
            ((*label).to_string(), tail)
        },
        _ => (UNKNOWN_PARTITION.to_string(), rest),
    }
}

/// Split a stem into `(subject_id, variant_suffix)` on the first underscore
fn split_subject(stem: &str) -> Option<(String, String)> {
    match stem.split_once('_') {
        Some((subject, rest)) if !subject.is_empty() => {
            let variant = if rest.is_empty() { DEFAULT_VARIANT } else { rest };
            Some((subject.to_string(), variant.to_string()))
        },
        Some(_) => None,
        None if stem.is_empty() => None,
        None => Some((stem.to_string(), DEFAULT_VARIANT.to_string())),
    }
}

/// Parse an edit prompt key.
///
/// Layout: `{edit_prompts_root}/{category}/{group_dir}/[{partition}/...]{subject}_{variant}.txt`.
/// The partition is the first middle segment that is a partition label.
pub fn parse_edit_prompt_key(layout: &KeyLayout, key: &str) -> Option<WorkItem> {
    let relative = key.strip_prefix(&dir_prefix(&layout.edit_prompts_root))?;
    let parts: Vec<&str> = relative.split('/').collect();
    if parts.len() < 3 {
        return None;
    }

    let category = parts.first()?.parse::<Category>().ok()?;
    let group = Group::from_dir_token(parts.get(1)?)?;
    let filename = parts.last()?;

    let (stem, extension) = split_extension(filename)?;
    if extension != PROMPT_EXTENSION {
        return None;
    }
    let (subject_id, variant_suffix) = split_subject(stem)?;

    let partition = parts
        .get(2..parts.len() - 1)
        .unwrap_or_default()
        .iter()
        .find(|segment| is_partition_label(segment))
        .map_or_else(|| UNKNOWN_PARTITION.to_string(), |segment| (*segment).to_string());

    Some(WorkItem {
        category,
        group,
        partition,
        subject_id,
        variant_suffix,
        source_key: key.to_string(),
    })
}

/// Parse an edited image key, the input of the try-on job.
///
/// Layout: `{output_root}/{category}/{group}/{subject}_partition_{n}_{variant}.png`.
/// The partition is the label right after the subject id, as written by the
/// edit job.
pub fn parse_edited_image_key(layout: &KeyLayout, key: &str) -> Option<WorkItem> {
    let relative = key.strip_prefix(&dir_prefix(&layout.output_root))?;
    let parts: Vec<&str> = relative.split('/').collect();
    let [category, group, filename] = parts.as_slice() else {
        return None;
    };

    let category = category.parse::<Category>().ok()?;
    let group = group.parse::<Group>().ok()?;
    let (stem, extension) = split_extension(filename)?;
    if extension != IMAGE_EXTENSION {
        return None;
    }

    let tokens: Vec<&str> = stem.split('_').collect();
    let (subject_id, rest) = tokens.split_first()?;
    if subject_id.is_empty() {
        return None;
    }

    let (partition, variant_tokens) = split_stem_partition(rest);
    let variant_suffix = if variant_tokens.is_empty() {
        DEFAULT_VARIANT.to_string()
    } else {
        variant_tokens.join("_")
    };

    Some(WorkItem {
        category,
        group,
        partition,
        subject_id: (*subject_id).to_string(),
        variant_suffix,
        source_key: key.to_string(),
    })
}

/// Edited output key: `{output_root}/{category}/{group}/{subject}_{partition}_{variant}.png`
pub fn edit_target_key(layout: &KeyLayout, item: &WorkItem) -> String {
    join_key(
        &layout.output_root,
        &format!(
            "{}/{}/{}_{}_{}.{IMAGE_EXTENSION}",
            item.category, item.group, item.subject_id, item.partition, item.variant_suffix
        ),
    )
}

/// Source person image: `{images_root}/{group}/{group}/images/{subject}.png`
pub fn edit_source_image_key(layout: &KeyLayout, item: &WorkItem) -> String {
    join_key(
        &layout.images_root,
        &format!(
            "{group}/{group}/images/{}.{IMAGE_EXTENSION}",
            item.subject_id,
            group = item.group
        ),
    )
}

/// Try-on artifact key:
/// `{ultimate_root}/{category}/{group}/{kind_dir}/{stem}_{kind_suffix}.png`
pub fn vton_artifact_key(layout: &KeyLayout, item: &WorkItem, kind: ArtifactKind) -> String {
    join_key(
        &layout.ultimate_root,
        &format!(
            "{}/{}/{}/{}_{}.{IMAGE_EXTENSION}",
            item.category,
            item.group,
            kind.dir_name(),
            item.source_stem(),
            kind.suffix()
        ),
    )
}

/// Listing prefix for the garment images of `group`
pub fn clothes_images_prefix(layout: &KeyLayout, group: Group) -> String {
    dir_prefix(&join_key(&layout.clothes_root, &format!("{group}/images")))
}

/// Sibling prompt of a garment image: `.../images/{stem}.ext` -> `.../prompts/{stem}.txt`
pub fn cloth_prompt_key(cloth_key: &str) -> Option<String> {
    let (dir, filename) = cloth_key.rsplit_once("/images/")?;
    let (stem, _) = split_extension(filename)?;
    Some(format!("{dir}/prompts/{stem}.{PROMPT_EXTENSION}"))
}

/// Prompt directory name for a group, e.g. `edit_female`
pub fn prompt_group_dir(layout: &KeyLayout, group: Group) -> String {
    format!("{}{group}", layout.prompt_group_dir_prefix)
}
