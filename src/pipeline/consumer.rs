//! Generation stage: pop packages in order, generate behind the gate and
//! supervise background uploads

use super::{Artifact, QueueMessage, WorkPackage};
use crate::config::ManifestPolicy;
use crate::error::{ForgeError, Result};
use crate::generation::GenerationBackend;
use crate::jobs::Job;
use crate::manifest::{ManifestBuffer, ManifestEntry};
use crate::services::{ImageCodec, ItemEvent, PipelineStage, ProgressReporter};
use crate::storage::{ObjectStore, PNG_CONTENT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

/// What the generation stage did with the queue
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsumerOutcome {
    pub generated: usize,
    pub generation_failed: usize,
    pub uploads_started: usize,
    pub uploads_completed: usize,
    pub uploads_failed: usize,
    #[serde(skip)]
    pub manifest: ManifestBuffer,
}

/// Uploads of one package, run as a single background task
struct UploadGroup {
    source_key: String,
    attempted: usize,
    failed: usize,
    /// Entry to record once every upload landed
    pending_entry: Option<ManifestEntry>,
}

async fn upload_artifact(store: &dyn ObjectStore, artifact: Artifact) -> Result<()> {
    let Artifact { key, image } = artifact;
    let body = tokio::task::spawn_blocking(move || ImageCodec::encode_png(&image))
        .await
        .map_err(|e| ForgeError::internal(format!("encode task failed: {e}")))??;
    store.put(&key, body, PNG_CONTENT_TYPE).await
}

/// A generation that left the gate, with the package it was run for
struct Generation {
    package: WorkPackage,
    started: Instant,
    output: Result<image::DynamicImage>,
}

/// Tracks in-flight upload groups and folds their results into the outcome
struct UploadSupervisor {
    store: Arc<dyn ObjectStore>,
    reporter: Arc<dyn ProgressReporter>,
    tasks: JoinSet<UploadGroup>,
}

impl UploadSupervisor {
    fn new(store: Arc<dyn ObjectStore>, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            store,
            reporter,
            tasks: JoinSet::new(),
        }
    }

    /// Start every upload of a package concurrently in one background task
    fn spawn(
        &mut self,
        source_key: String,
        artifacts: Vec<Artifact>,
        pending_entry: Option<ManifestEntry>,
        outcome: &mut ConsumerOutcome,
    ) {
        let attempted = artifacts.len();
        outcome.uploads_started += attempted;
        let store = Arc::clone(&self.store);

        self.tasks.spawn(async move {
            let uploads = artifacts.into_iter().map(|artifact| {
                let store = Arc::clone(&store);
                async move {
                    let key = artifact.key.clone();
                    let result = upload_artifact(store.as_ref(), artifact).await;
                    if let Err(e) = &result {
                        warn!(key = %key, error = %e, "⚠️  Upload failed");
                    }
                    result
                }
            });
            let failed = futures::future::join_all(uploads)
                .await
                .iter()
                .filter(|result| result.is_err())
                .count();

            UploadGroup {
                source_key,
                attempted,
                failed,
                pending_entry,
            }
        });
    }

    fn absorb(&self, joined: std::result::Result<UploadGroup, JoinError>, outcome: &mut ConsumerOutcome) {
        let group = match joined {
            Ok(group) => group,
            Err(e) => {
                error!(error = %e, "Upload task aborted");
                self.reporter
                    .report_error(PipelineStage::Upload, &format!("upload task aborted: {e}"));
                return;
            },
        };

        outcome.uploads_completed += group.attempted - group.failed;
        outcome.uploads_failed += group.failed;

        if group.failed == 0 {
            debug!(source = %group.source_key, uploads = group.attempted, "Uploads landed");
            self.reporter.report_item(ItemEvent::Uploaded, &group.source_key);
            if let Some(entry) = group.pending_entry {
                outcome.manifest.push(entry);
            }
        } else {
            self.reporter.report_item(ItemEvent::UploadFailed, &group.source_key);
            self.reporter.report_error(
                PipelineStage::Upload,
                &format!("{} of {} uploads failed for {}", group.failed, group.attempted, group.source_key),
            );
        }
    }

    /// Fold in groups that already finished without waiting
    fn reap(&mut self, outcome: &mut ConsumerOutcome) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.absorb(joined, outcome);
        }
    }

    /// Wait for every outstanding group
    async fn drain(&mut self, outcome: &mut ConsumerOutcome) {
        if !self.tasks.is_empty() {
            info!(pending = self.tasks.len(), "⏳ Waiting for uploads to finish");
        }
        while let Some(joined) = self.tasks.join_next().await {
            self.absorb(joined, outcome);
        }
    }
}

/// Consumer half of the pipeline
pub struct GenerationStage<J: ?Sized> {
    job: Arc<J>,
    store: Arc<dyn ObjectStore>,
    backend: Arc<dyn GenerationBackend>,
    gate: Arc<Semaphore>,
    policy: ManifestPolicy,
    reporter: Arc<dyn ProgressReporter>,
}

impl<J: Job + ?Sized> GenerationStage<J> {
    pub fn new(
        job: Arc<J>,
        store: Arc<dyn ObjectStore>,
        backend: Arc<dyn GenerationBackend>,
        gate: Arc<Semaphore>,
        policy: ManifestPolicy,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            job,
            store,
            backend,
            gate,
            policy,
            reporter,
        }
    }

    /// Wait for a gate permit, folding in generations that finish meanwhile
    async fn acquire(
        &self,
        generations: &mut JoinSet<Generation>,
        uploads: &mut UploadSupervisor,
        outcome: &mut ConsumerOutcome,
    ) -> Result<OwnedSemaphorePermit> {
        loop {
            tokio::select! {
                permit = Arc::clone(&self.gate).acquire_owned() => {
                    return permit.map_err(|_| ForgeError::pipeline("generation gate closed"));
                },
                Some(joined) = generations.join_next(), if !generations.is_empty() => {
                    self.finish(joined, uploads, outcome);
                },
            }
        }
    }

    /// Start one generation on a blocking thread; the permit is released
    /// when the backend call returns
    fn start(&self, package: WorkPackage, permit: OwnedSemaphorePermit, generations: &mut JoinSet<Generation>) {
        let backend = Arc::clone(&self.backend);
        let request = self.job.request(&package);
        let started = Instant::now();

        generations.spawn(async move {
            let output = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                backend.generate(&request)
            })
            .await
            .map_err(|e| ForgeError::generation(format!("generation task failed: {e}")))
            .and_then(|result| result);

            Generation {
                package,
                started,
                output,
            }
        });
    }

    /// Count a finished generation and schedule its uploads
    fn finish(
        &self,
        joined: std::result::Result<Generation, JoinError>,
        uploads: &mut UploadSupervisor,
        outcome: &mut ConsumerOutcome,
    ) {
        let Generation {
            package,
            started,
            output,
        } = match joined {
            Ok(generation) => generation,
            Err(e) => {
                error!(error = %e, "Generation task aborted");
                outcome.generation_failed += 1;
                self.reporter
                    .report_error(PipelineStage::Generation, &format!("generation task aborted: {e}"));
                return;
            },
        };
        let source_key = package.item.source_key.clone();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!(source = %source_key, error = %e, "❌ Generation failed, continuing");
                outcome.generation_failed += 1;
                self.reporter.report_item(ItemEvent::GenerationFailed, &source_key);
                self.reporter.report_error(PipelineStage::Generation, &e.to_string());
                return;
            },
        };

        info!(
            source = %source_key,
            target = %package.target_key,
            elapsed_ms = started.elapsed().as_millis(),
            "✅ Generated"
        );
        outcome.generated += 1;
        self.reporter.report_item(ItemEvent::Generated, &source_key);

        let entry = self.job.manifest_entry(self.store.as_ref(), &package);
        let artifacts = self.job.artifacts(&package, output);
        let pending_entry = match self.policy {
            ManifestPolicy::Optimistic => {
                if let Some(entry) = entry {
                    outcome.manifest.push(entry);
                }
                None
            },
            ManifestPolicy::Confirmed => entry,
        };
        uploads.spawn(source_key, artifacts, pending_entry, outcome);
    }

    /// Consume packages until `Done`, then wait for every generation and
    /// upload.
    ///
    /// Packages start generating in dequeue order, at most as many at once as
    /// the gate has permits. A failed generation is counted and skipped.
    /// Uploads never block the next generation.
    ///
    /// # Errors
    /// - The queue closed without a `Done` message
    /// - The generation gate was closed
    #[instrument(skip_all, fields(job = self.job.name()))]
    pub async fn run(self, mut rx: mpsc::Receiver<QueueMessage>) -> Result<ConsumerOutcome> {
        let mut outcome = ConsumerOutcome::default();
        let mut generations = JoinSet::new();
        let mut uploads = UploadSupervisor::new(Arc::clone(&self.store), Arc::clone(&self.reporter));

        let finished = loop {
            match rx.recv().await {
                Some(QueueMessage::Package(package)) => {
                    match self.acquire(&mut generations, &mut uploads, &mut outcome).await {
                        Ok(permit) => self.start(*package, permit, &mut generations),
                        Err(e) => break Err(e),
                    }
                    while let Some(joined) = generations.try_join_next() {
                        self.finish(joined, &mut uploads, &mut outcome);
                    }
                    uploads.reap(&mut outcome);
                },
                Some(QueueMessage::Done) => break Ok(()),
                None => {
                    break Err(ForgeError::pipeline(
                        "queue closed before the download stage signalled completion",
                    ))
                },
            }
        };

        while let Some(joined) = generations.join_next().await {
            self.finish(joined, &mut uploads, &mut outcome);
        }
        uploads.drain(&mut outcome).await;
        finished?;

        info!(
            generated = outcome.generated,
            failed = outcome.generation_failed,
            uploads = outcome.uploads_completed,
            upload_failures = outcome.uploads_failed,
            "🎨 Generation stage finished"
        );
        Ok(outcome)
    }
}
