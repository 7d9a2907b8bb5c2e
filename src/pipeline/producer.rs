//! Download stage: fetch inputs one item at a time and feed the bounded queue

use super::QueueMessage;
use crate::config::WorkOrder;
use crate::error::{ForgeError, Result};
use crate::filter::WorkFilter;
use crate::jobs::Job;
use crate::resume::ResumeIndex;
use crate::services::{ItemEvent, PipelineStage, ProgressReporter};
use crate::storage::ObjectStore;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Put the backlog in processing order.
///
/// Keys are always sorted first so a seeded shuffle yields the same
/// permutation regardless of listing order.
pub fn order_backlog(keys: &mut [String], order: WorkOrder) {
    keys.sort_unstable();
    if let WorkOrder::Shuffled { seed } = order {
        let mut rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        keys.shuffle(&mut rng);
    }
}

/// What the download stage did with the backlog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProducerStats {
    pub candidates: usize,
    /// Keys that did not parse as work items
    pub unparsed: usize,
    /// Parsed items rejected by the filter
    pub filtered: usize,
    pub skipped_existing: usize,
    pub skipped_missing: usize,
    pub queued: usize,
}

/// Producer half of the pipeline
pub struct DownloadStage<J: ?Sized> {
    job: Arc<J>,
    store: Arc<dyn ObjectStore>,
    reporter: Arc<dyn ProgressReporter>,
}

impl<J: Job + ?Sized> DownloadStage<J> {
    pub fn new(job: Arc<J>, store: Arc<dyn ObjectStore>, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            job,
            store,
            reporter,
        }
    }

    /// Walk the backlog sequentially, pushing one package per eligible item.
    ///
    /// `send` waits while the queue is full, so at most one package is held
    /// here beyond the queue capacity. `Done` is sent after the last item.
    ///
    /// # Errors
    /// - The generation stage dropped its receiver
    #[instrument(skip_all, fields(job = self.job.name(), candidates = candidates.len()))]
    pub async fn run(
        self,
        mut candidates: Vec<String>,
        resume: ResumeIndex,
        filter: WorkFilter,
        order: WorkOrder,
        tx: mpsc::Sender<QueueMessage>,
    ) -> Result<ProducerStats> {
        order_backlog(&mut candidates, order);
        let mut stats = ProducerStats {
            candidates: candidates.len(),
            ..ProducerStats::default()
        };

        for key in candidates {
            let Some(item) = self.job.parse(&key) else {
                debug!(key = %key, "Skipping unparseable key");
                stats.unparsed += 1;
                continue;
            };
            if !filter.matches(&item) {
                stats.filtered += 1;
                continue;
            }

            let target_key = self.job.target_key(&item);
            if resume.contains(&target_key) {
                debug!(target = %target_key, "Output exists, skipping");
                stats.skipped_existing += 1;
                self.reporter.report_item(ItemEvent::SkippedExisting, &key);
                continue;
            }

            let package = match self.job.fetch(self.store.as_ref(), item, target_key).await {
                Ok(package) => package,
                Err(missing) => {
                    warn!(source = %key, missing = %missing, "⚠️  Input unavailable, skipping");
                    stats.skipped_missing += 1;
                    self.reporter.report_item(ItemEvent::SkippedMissing, &key);
                    continue;
                },
            };

            tx.send(QueueMessage::Package(Box::new(package)))
                .await
                .map_err(|_| {
                    self.reporter
                        .report_error(PipelineStage::Download, "generation stage stopped receiving");
                    ForgeError::pipeline(format!("queue closed before {key} could be sent"))
                })?;
            stats.queued += 1;
            self.reporter.report_item(ItemEvent::Queued, &key);
        }

        tx.send(QueueMessage::Done)
            .await
            .map_err(|_| ForgeError::pipeline("queue closed before completion could be signalled"))?;

        info!(
            queued = stats.queued,
            existing = stats.skipped_existing,
            missing = stats.skipped_missing,
            "📦 Download stage finished"
        );
        Ok(stats)
    }
}
