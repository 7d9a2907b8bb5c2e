//! Try-on manifest: one JSON object per line referencing an artifact triplet

use crate::error::{ForgeError, Result};
use crate::storage::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// URIs of the three artifacts of one try-on sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub initial_image: String,
    pub cloth_image: String,
    pub try_on_image: String,
}

impl ManifestEntry {
    /// `(field, uri)` pairs in serialization order
    pub fn uris(&self) -> [(&'static str, &str); 3] {
        [
            ("initial_image", self.initial_image.as_str()),
            ("cloth_image", self.cloth_image.as_str()),
            ("try_on_image", self.try_on_image.as_str()),
        ]
    }
}

/// Process-local, append-only list of manifest entries
#[derive(Debug, Default, Clone)]
pub struct ManifestBuffer {
    entries: Vec<ManifestEntry>,
}

impl ManifestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ManifestEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as JSON lines, each terminated by `\n`
    ///
    /// # Errors
    /// - Serialization failures
    pub fn to_jsonl(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for entry in &self.entries {
            serde_json::to_writer(&mut out, entry)?;
            out.push(b'\n');
        }
        Ok(out)
    }
}

/// A manifest line that did not parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedLine {
    /// 1-based line number
    pub line: usize,
    pub error: String,
}

/// Result of parsing a JSON-lines manifest
#[derive(Debug, Default)]
pub struct ParsedManifest {
    /// Entries with their 1-based line numbers
    pub entries: Vec<(usize, ManifestEntry)>,
    pub malformed: Vec<MalformedLine>,
}

/// Parse JSON lines, skipping blank lines and collecting malformed ones
pub fn parse_jsonl(text: &str) -> ParsedManifest {
    let mut parsed = ParsedManifest::default();
    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ManifestEntry>(trimmed) {
            Ok(entry) => parsed.entries.push((line_no, entry)),
            Err(e) => parsed.malformed.push(MalformedLine {
                line: line_no,
                error: e.to_string(),
            }),
        }
    }
    parsed
}

/// Manifest entry with at least one artifact that is not in storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteEntry {
    pub line: usize,
    /// URIs that are absent, unreadable or outside the bucket
    pub missing: Vec<String>,
}

/// Outcome of checking a manifest against storage
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManifestVerification {
    pub key: String,
    pub total_entries: usize,
    pub complete_entries: usize,
    pub incomplete: Vec<IncompleteEntry>,
    pub malformed: Vec<MalformedLine>,
}

impl ManifestVerification {
    pub fn is_consistent(&self) -> bool {
        self.incomplete.is_empty() && self.malformed.is_empty()
    }
}

async fn artifact_present(store: &dyn ObjectStore, uri: &str) -> bool {
    let Some(key) = store.key_from_uri(uri) else {
        warn!(uri = %uri, "Manifest URI is outside this bucket");
        return false;
    };
    match store.head(&key).await {
        Ok(present) => present,
        Err(e) => {
            warn!(key = %key, error = %e, "Existence check failed, counting as missing");
            false
        },
    }
}

/// Read a manifest from storage and head every referenced artifact
///
/// # Errors
/// - The manifest object itself is missing or unreadable
#[instrument(skip(store))]
pub async fn verify_manifest(store: &dyn ObjectStore, key: &str) -> Result<ManifestVerification> {
    let bytes = store
        .get(key)
        .await?
        .ok_or_else(|| ForgeError::storage_op_error("read manifest", key, "object not found"))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| ForgeError::storage_op_error("decode manifest", key, e))?;

    let parsed = parse_jsonl(&text);
    let mut report = ManifestVerification {
        key: key.to_string(),
        total_entries: parsed.entries.len(),
        malformed: parsed.malformed,
        ..ManifestVerification::default()
    };

    for (line, entry) in &parsed.entries {
        let uris = entry.uris();
        let checks = futures::future::join_all(
            uris.iter().map(|(_, uri)| artifact_present(store, uri)),
        )
        .await;

        let missing: Vec<String> = uris
            .iter()
            .zip(checks)
            .filter(|(_, present)| !present)
            .map(|((_, uri), _)| (*uri).to_string())
            .collect();

        if missing.is_empty() {
            report.complete_entries += 1;
        } else {
            report.incomplete.push(IncompleteEntry {
                line: *line,
                missing,
            });
        }
    }

    info!(
        total = report.total_entries,
        complete = report.complete_entries,
        incomplete = report.incomplete.len(),
        malformed = report.malformed.len(),
        "Manifest verified"
    );
    Ok(report)
}
