//! Progress reporting service
//!
//! Stages report per-item outcomes through [`ProgressReporter`]; frontends
//! decide whether that becomes a progress bar, log lines or nothing.

use crate::pipeline::RunSummary;
use std::fmt;

/// Pipeline stage an event or error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Fetching inputs (producer)
    Download,
    /// Running the generation backend (consumer)
    Generation,
    /// Background uploads
    Upload,
    /// Persisting the run manifest
    Manifest,
}

impl PipelineStage {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            PipelineStage::Download => "download",
            PipelineStage::Generation => "generation",
            PipelineStage::Upload => "upload",
            PipelineStage::Manifest => "manifest",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Outcome of one step for one work item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEvent {
    /// Package handed to the generation stage
    Queued,
    /// Target already present at startup
    SkippedExisting,
    /// An input was absent, empty or undecodable
    SkippedMissing,
    Generated,
    GenerationFailed,
    /// Every upload of the package's group landed
    Uploaded,
    /// At least one upload of the package's group failed
    UploadFailed,
}

impl ItemEvent {
    /// Whether the event ends the item's journey through the backlog
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemEvent::SkippedExisting
                | ItemEvent::SkippedMissing
                | ItemEvent::Generated
                | ItemEvent::GenerationFailed
        )
    }
}

/// Sink for pipeline progress
pub trait ProgressReporter: Send + Sync {
    /// Number of candidates about to be processed
    fn report_backlog(&self, total: usize);

    /// One item changed state
    fn report_item(&self, event: ItemEvent, key: &str);

    /// A recoverable error
    fn report_error(&self, stage: PipelineStage, error: &str);

    /// The run finished
    fn report_completion(&self, _summary: &RunSummary) {}
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_backlog(&self, _total: usize) {}

    fn report_item(&self, _event: ItemEvent, _key: &str) {}

    fn report_error(&self, _stage: PipelineStage, _error: &str) {}
}

/// Reporter that writes every event to the tracing log
pub struct LogProgressReporter {
    verbose: bool,
}

impl LogProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for LogProgressReporter {
    fn report_backlog(&self, total: usize) {
        tracing::info!(total, "📋 Backlog ready");
    }

    fn report_item(&self, event: ItemEvent, key: &str) {
        if self.verbose || !matches!(event, ItemEvent::Queued | ItemEvent::Uploaded) {
            tracing::debug!(event = ?event, key = %key, "Item progress");
        }
    }

    fn report_error(&self, stage: PipelineStage, error: &str) {
        tracing::error!(stage = %stage, error = %error, "❌ Stage error");
    }

    fn report_completion(&self, summary: &RunSummary) {
        tracing::info!(
            generated = summary.generated,
            failed = summary.generation_failed,
            skipped = summary.skipped_existing + summary.skipped_missing,
            "✅ Run completed"
        );
    }
}

#[cfg(feature = "cli")]
pub use bar::BarProgressReporter;

#[cfg(feature = "cli")]
mod bar {
    use super::{ItemEvent, PipelineStage, ProgressReporter};
    use crate::pipeline::RunSummary;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Terminal progress bar advanced once per finished backlog item
    pub struct BarProgressReporter {
        bar: ProgressBar,
        generated: AtomicUsize,
        skipped: AtomicUsize,
        failed: AtomicUsize,
    }

    impl BarProgressReporter {
        #[must_use]
        pub fn new() -> Self {
            let bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            ) {
                bar.set_style(style.progress_chars("#>-"));
            }
            Self {
                bar,
                generated: AtomicUsize::new(0),
                skipped: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            }
        }

        fn refresh_message(&self) {
            self.bar.set_message(format!(
                "generated {} · skipped {} · failed {}",
                self.generated.load(Ordering::Relaxed),
                self.skipped.load(Ordering::Relaxed),
                self.failed.load(Ordering::Relaxed)
            ));
        }
    }

    impl Default for BarProgressReporter {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ProgressReporter for BarProgressReporter {
        fn report_backlog(&self, total: usize) {
            self.bar.set_length(total as u64);
        }

        fn report_item(&self, event: ItemEvent, _key: &str) {
            if !event.is_terminal() {
                return;
            }
            match event {
                ItemEvent::Generated => {
                    self.generated.fetch_add(1, Ordering::Relaxed);
                },
                ItemEvent::SkippedExisting | ItemEvent::SkippedMissing => {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                },
                ItemEvent::GenerationFailed => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                },
                _ => {},
            }
            self.bar.inc(1);
            self.refresh_message();
        }

        fn report_error(&self, stage: PipelineStage, error: &str) {
            self.bar.println(format!("❌ {stage}: {error}"));
        }

        fn report_completion(&self, summary: &RunSummary) {
            self.bar.finish_with_message(format!(
                "done: {} generated, {} failed",
                summary.generated, summary.generation_failed
            ));
        }
    }

}

/// Pick the reporter for a CLI run
#[cfg(feature = "cli")]
pub fn create_cli_progress_reporter(
    enable_progress: bool,
    verbose: bool,
) -> std::sync::Arc<dyn ProgressReporter> {
    if enable_progress {
        std::sync::Arc::new(BarProgressReporter::new())
    } else {
        std::sync::Arc::new(LogProgressReporter::new(verbose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingReporter {
        backlog: Mutex<Option<usize>>,
        items: Arc<Mutex<Vec<(ItemEvent, String)>>>,
        errors: Arc<Mutex<Vec<(PipelineStage, String)>>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report_backlog(&self, total: usize) {
            *self.backlog.lock().unwrap() = Some(total);
        }

        fn report_item(&self, event: ItemEvent, key: &str) {
            self.items.lock().unwrap().push((event, key.to_string()));
        }

        fn report_error(&self, stage: PipelineStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }
    }

    #[test]
    fn test_reporter_trait_object() {
        let reporter = RecordingReporter::default();
        let dyn_reporter: &dyn ProgressReporter = &reporter;

        dyn_reporter.report_backlog(3);
        dyn_reporter.report_item(ItemEvent::Queued, "a");
        dyn_reporter.report_item(ItemEvent::Generated, "a");
        dyn_reporter.report_error(PipelineStage::Upload, "boom");
        dyn_reporter.report_completion(&RunSummary::default());

        assert_eq!(*reporter.backlog.lock().unwrap(), Some(3));
        assert_eq!(reporter.items.lock().unwrap().len(), 2);
        assert_eq!(
            reporter.errors.lock().unwrap().first(),
            Some(&(PipelineStage::Upload, "boom".to_string()))
        );
    }

    #[test]
    fn test_terminal_events() {
        assert!(ItemEvent::Generated.is_terminal());
        assert!(ItemEvent::SkippedExisting.is_terminal());
        assert!(ItemEvent::GenerationFailed.is_terminal());
        assert!(!ItemEvent::Queued.is_terminal());
        assert!(!ItemEvent::Uploaded.is_terminal());
    }

    #[test]
    fn test_stage_descriptions() {
        assert_eq!(PipelineStage::Generation.to_string(), "generation");
        assert_eq!(PipelineStage::Manifest.description(), "manifest");
    }

    #[test]
    fn test_noop_reporter_accepts_everything() {
        let reporter = NoOpProgressReporter;
        reporter.report_backlog(10);
        reporter.report_item(ItemEvent::UploadFailed, "k");
        reporter.report_error(PipelineStage::Download, "e");
        reporter.report_completion(&RunSummary::default());
    }
}
