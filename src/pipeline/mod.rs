//! Bounded producer/consumer pipeline
//!
//! The download stage fetches inputs for one item at a time and pushes
//! complete [`WorkPackage`]s onto a bounded queue; the generation stage pops
//! them in order, runs the backend behind a counting gate and hands results
//! to background uploads that are joined before the stage returns.

mod consumer;
mod driver;
mod producer;

pub use consumer::{ConsumerOutcome, GenerationStage};
pub use driver::Pipeline;
pub use producer::{order_backlog, DownloadStage, ProducerStats};

use crate::keys::WorkItem;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Message carried by the bounded queue
#[derive(Debug)]
pub enum QueueMessage {
    Package(Box<WorkPackage>),
    /// Sent once after the last package
    Done,
}

/// Secondary input image of a package (the garment for try-on)
#[derive(Debug, Clone)]
pub struct AuxiliaryInput {
    pub key: String,
    pub image: Arc<DynamicImage>,
}

/// Fully downloaded unit of work, owned by exactly one stage at a time
#[derive(Debug, Clone)]
pub struct WorkPackage {
    pub item: WorkItem,
    pub target_key: String,
    pub primary: Arc<DynamicImage>,
    pub auxiliary: Vec<AuxiliaryInput>,
    pub prompt: String,
}

/// One image to upload after a successful generation
#[derive(Debug, Clone)]
pub struct Artifact {
    pub key: String,
    pub image: Arc<DynamicImage>,
}

/// Why an item was dropped before reaching the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingInput {
    pub key: String,
    pub reason: String,
}

impl MissingInput {
    pub fn new<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MissingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

/// Counters and timing of one pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub job: String,
    pub filter: String,
    pub candidates: usize,
    pub skipped_existing: usize,
    pub skipped_missing: usize,
    pub queued: usize,
    pub generated: usize,
    pub generation_failed: usize,
    pub uploads_started: usize,
    pub uploads_completed: usize,
    pub uploads_failed: usize,
    pub manifest_entries: usize,
    pub manifest_key: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    /// Wall-clock duration in milliseconds, when both timestamps are set
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    /// Fraction of queued packages that produced an output
    pub fn success_rate(&self) -> f64 {
        if self.queued == 0 {
            return 0.0;
        }
        self.generated as f64 / self.queued as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_summary_rates_and_duration() {
        let start = Utc::now();
        let summary = RunSummary {
            queued: 4,
            generated: 3,
            started_at: Some(start),
            finished_at: Some(start + Duration::milliseconds(1500)),
            ..RunSummary::default()
        };
        assert!((summary.success_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(summary.duration_ms(), Some(1500));
        assert!(RunSummary::default().success_rate().abs() < f64::EPSILON);
        assert_eq!(RunSummary::default().duration_ms(), None);
    }

    #[test]
    fn test_summary_serializes() {
        let summary = RunSummary {
            job: "edit".to_string(),
            generated: 2,
            ..RunSummary::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["job"], "edit");
        assert_eq!(json["generated"], 2);
        assert!(json["manifest_key"].is_null());
    }

    #[test]
    fn test_missing_input_display() {
        let missing = MissingInput::new("dataset/female/female/images/1.png", "not found");
        assert_eq!(missing.to_string(), "dataset/female/female/images/1.png: not found");
    }
}
