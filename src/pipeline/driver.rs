//! Pipeline driver: resume index, enumeration, both stages and the manifest

use super::{ConsumerOutcome, DownloadStage, GenerationStage, ProducerStats, RunSummary};
use crate::config::PipelineConfig;
use crate::enumerate::enumerate_candidates;
use crate::error::{ForgeError, Result};
use crate::filter::WorkFilter;
use crate::generation::GenerationBackend;
use crate::jobs::Job;
use crate::manifest::ManifestBuffer;
use crate::resume::ResumeIndex;
use crate::services::{NoOpProgressReporter, PipelineStage, ProgressReporter};
use crate::storage::{ObjectStore, JSONL_CONTENT_TYPE};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, instrument};

/// Runs jobs against one store and one initialized backend
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    backend: Arc<dyn GenerationBackend>,
    config: PipelineConfig,
    reporter: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ObjectStore>, backend: Arc<dyn GenerationBackend>, config: PipelineConfig) -> Self {
        Self {
            store,
            backend,
            config,
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every eligible item of `job` once.
    ///
    /// Builds the resume index, enumerates candidates, then runs the download
    /// and generation stages concurrently over a bounded queue. Returns after
    /// both stages finished and every upload settled. Per-item failures are
    /// counted in the summary, not returned.
    ///
    /// # Errors
    /// - The backend is not initialized
    /// - The job's layout has an empty root
    /// - A stage stopped early or panicked
    #[instrument(skip_all, fields(job = job.name(), filter = %filter))]
    pub async fn run<J>(&self, job: Arc<J>, filter: &WorkFilter) -> Result<RunSummary>
    where
        J: Job + 'static,
    {
        if !self.backend.is_initialized() {
            return Err(ForgeError::generation("generation backend is not initialized"));
        }
        job.layout().validate()?;
        let started_at = Utc::now();
        info!(
            queue_capacity = self.config.queue_capacity,
            gate_permits = self.config.gate_permits,
            "🚀 Starting pipeline"
        );

        let resume = ResumeIndex::build(self.store.as_ref(), &job.resume_prefixes(filter)).await;
        let candidates = enumerate_candidates(self.store.as_ref(), job.as_ref(), filter).await;
        self.reporter.report_backlog(candidates.len());

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let gate = Arc::new(Semaphore::new(self.config.gate_permits));

        let producer = DownloadStage::new(Arc::clone(&job), Arc::clone(&self.store), Arc::clone(&self.reporter));
        let consumer = GenerationStage::new(
            Arc::clone(&job),
            Arc::clone(&self.store),
            Arc::clone(&self.backend),
            gate,
            self.config.manifest_policy,
            Arc::clone(&self.reporter),
        );

        // Either stage stopping drops its channel half, which ends the other.
        let producer_task = tokio::spawn(producer.run(candidates, resume, filter.clone(), self.config.order, tx));
        let consumer_task = tokio::spawn(consumer.run(rx));
        let (produced, consumed) = tokio::join!(producer_task, consumer_task);

        let stats = produced.map_err(|e| ForgeError::pipeline(format!("download stage panicked: {e}")))??;
        let outcome = consumed.map_err(|e| ForgeError::pipeline(format!("generation stage panicked: {e}")))??;

        let manifest_key = match job.manifest_key(filter) {
            Some(key) if !outcome.manifest.is_empty() => self.write_manifest(&key, &outcome.manifest).await,
            _ => None,
        };

        let summary = Self::summarize(job.name(), filter, &stats, &outcome, manifest_key, started_at);
        info!(
            generated = summary.generated,
            failed = summary.generation_failed,
            skipped_existing = summary.skipped_existing,
            skipped_missing = summary.skipped_missing,
            duration_ms = summary.duration_ms().unwrap_or_default(),
            "🏁 Pipeline finished"
        );
        self.reporter.report_completion(&summary);
        Ok(summary)
    }

    /// Persist the manifest in one put; a failure is reported, not returned
    async fn write_manifest(&self, key: &str, manifest: &ManifestBuffer) -> Option<String> {
        let written = match manifest.to_jsonl() {
            Ok(body) => self.store.put(key, body, JSONL_CONTENT_TYPE).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => {
                info!(key = %key, entries = manifest.len(), "📝 Manifest written");
                Some(key.to_string())
            },
            Err(e) => {
                error!(key = %key, error = %e, "Failed to write manifest");
                self.reporter.report_error(PipelineStage::Manifest, &e.to_string());
                None
            },
        }
    }

    fn summarize(
        job: &str,
        filter: &WorkFilter,
        stats: &ProducerStats,
        outcome: &ConsumerOutcome,
        manifest_key: Option<String>,
        started_at: chrono::DateTime<Utc>,
    ) -> RunSummary {
        RunSummary {
            job: job.to_string(),
            filter: filter.label(),
            candidates: stats.candidates,
            skipped_existing: stats.skipped_existing,
            skipped_missing: stats.skipped_missing,
            queued: stats.queued,
            generated: outcome.generated,
            generation_failed: outcome.generation_failed,
            uploads_started: outcome.uploads_started,
            uploads_completed: outcome.uploads_completed,
            uploads_failed: outcome.uploads_failed,
            manifest_entries: outcome.manifest.len(),
            manifest_key,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockGenerationBackend;
    use crate::config::KeyLayout;
    use crate::generation::GenerationBackend as _;
    use crate::jobs::EditJob;
    use crate::storage::MemoryObjectStore;

    #[tokio::test]
    async fn test_uninitialized_backend_is_rejected() {
        let pipeline = Pipeline::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MockGenerationBackend::new()),
            PipelineConfig::default(),
        );
        let job = Arc::new(EditJob::new(KeyLayout::default()));
        assert!(pipeline.run(job, &WorkFilter::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_store_produces_empty_summary() {
        let mut backend = MockGenerationBackend::new();
        backend.initialize().unwrap();
        let pipeline = Pipeline::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(backend),
            PipelineConfig::default(),
        );
        let job = Arc::new(EditJob::new(KeyLayout::default()));
        let summary = pipeline.run(job, &WorkFilter::new()).await.unwrap();
        assert_eq!(summary.job, "edit");
        assert_eq!(summary.candidates, 0);
        assert_eq!(summary.generated, 0);
        assert!(summary.manifest_key.is_none());
        assert!(summary.duration_ms().is_some());
    }

    #[tokio::test]
    async fn test_job_with_empty_root_is_rejected() {
        let mut backend = MockGenerationBackend::new();
        backend.initialize().unwrap();
        let store = MemoryObjectStore::new();
        let pipeline = Pipeline::new(Arc::new(store.clone()), Arc::new(backend), PipelineConfig::default());
        let layout = KeyLayout {
            output_root: String::new(),
            ..KeyLayout::default()
        };

        let err = pipeline
            .run(Arc::new(EditJob::new(layout)), &WorkFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidConfig(_)));
        assert_eq!(store.list_calls(), 0);
    }
}
