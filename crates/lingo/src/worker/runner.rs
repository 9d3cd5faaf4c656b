//! Job runner: claims a job, translates it segment by segment, and records
//! the outcome in the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use super::translator::Translator;
use crate::model::{ParagraphMeta, SegmentResult};
use crate::store::{StoreError, TranslationStore};
use crate::text::{split_paragraphs, SplitParagraph};

/// How long a claim stays valid without renewal.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(30);

const MAX_ERROR_DETAIL: usize = 200;

/// How a claimed run ended without recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    /// The run stopped early; the lease is left to expire so recovery can
    /// pick the job up again.
    Abandoned(&'static str),
}

/// A failure message to record on the job.
#[derive(Debug)]
struct Failure(String);

impl Failure {
    fn new(message: impl Into<String>) -> Self {
        Failure(message.into())
    }
}

#[derive(Clone)]
pub struct JobRunner {
    store: TranslationStore,
    translator: Arc<dyn Translator>,
    lease_duration: Duration,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl JobRunner {
    pub fn new(store: TranslationStore, translator: Arc<dyn Translator>) -> Self {
        Self {
            store,
            translator,
            lease_duration: DEFAULT_LEASE_DURATION,
            permits: Arc::new(Semaphore::new(num_cpus::get().max(1))),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(jobs.max(1)));
        self
    }

    pub fn store(&self) -> &TranslationStore {
        &self.store
    }

    /// Cancelled when the runner shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Claims `id` and starts processing it in the background.
    ///
    /// Returns `false` when the job does not exist, is already finished, or
    /// is leased by someone else.
    pub async fn start_processing(&self, id: &str) -> Result<bool, StoreError> {
        let owned = id.to_string();
        let status = match self.store.call(move |s| s.status(&owned)).await {
            Ok(summary) => summary.status,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        if status.is_terminal() {
            return Ok(false);
        }

        let owned = id.to_string();
        let lease = self.lease_duration;
        if !self
            .store
            .call(move |s| s.claim_translation_job(&owned, lease))
            .await?
        {
            debug!(translation_id = %id, "Lease held elsewhere, not starting");
            return Ok(false);
        }

        let runner = self.clone();
        let span = info_span!("translation_job", translation_id = %id);
        let id = id.to_string();
        self.tracker
            .spawn(async move { runner.run_claimed(id).await }.instrument(span));
        Ok(true)
    }

    /// Starts every job the recovery query returns. Returns how many were
    /// started by this call.
    pub async fn resume_restartable_jobs(&self) -> Result<usize, StoreError> {
        let ids = self
            .store
            .call(|s| s.list_restartable_translation_ids())
            .await?;
        let mut started = 0;
        for id in ids {
            match self.start_processing(&id).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => warn!(translation_id = %id, "Failed to resume job: {}", e),
            }
        }
        if started > 0 {
            info!("Resumed {} translation job(s)", started);
        }
        Ok(started)
    }

    /// Waits for every job started so far to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stops running jobs at the next segment boundary and waits for them.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn run_claimed(&self, id: String) {
        let _permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = self.shutdown.cancelled() => return,
        };

        match self.process(&id).await {
            Ok(Outcome::Completed) => info!("Translation completed"),
            Ok(Outcome::Abandoned(reason)) => info!("Translation run stopped: {}", reason),
            Err(Failure(message)) => {
                let owned = id.clone();
                let recorded = message.clone();
                if let Err(e) = self.store.call(move |s| s.fail(&owned, &recorded)).await {
                    warn!("Failed to record failure '{}': {}", message, e);
                }
            }
        }
    }

    async fn process(&self, id: &str) -> Result<Outcome, Failure> {
        // Waiting for a permit may have eaten into the lease.
        if !self.renew(id).await {
            return Ok(Outcome::Abandoned("lease lost before start"));
        }

        let owned = id.to_string();
        let translation = match self.store.call(move |s| s.get(&owned)).await {
            Ok(t) => t,
            Err(e) => {
                warn!("Failed to load translation: {}", e);
                return Ok(Outcome::Abandoned("translation unavailable"));
            }
        };

        let paragraphs = split_paragraphs(&translation.input_text);
        if paragraphs.is_empty() {
            return Err(Failure::new("No sentences found for segmentation"));
        }

        let plan = self.segment_all(&paragraphs).await?;
        let total: usize = plan.iter().map(Vec::len).sum();
        if total == 0 {
            return Err(Failure::new("No translatable segments found"));
        }

        let kept = match self.prepare(id, &paragraphs, &plan, total).await {
            Ok(kept) => kept,
            Err(e) => {
                warn!("Failed to prepare progress: {}", e);
                return Ok(Outcome::Abandoned("store unavailable"));
            }
        };

        for (idx, (paragraph, segments)) in paragraphs.iter().zip(&plan).enumerate() {
            if kept[idx] || segments.is_empty() {
                continue;
            }
            for segment in segments {
                if self.shutdown.is_cancelled() {
                    return Ok(Outcome::Abandoned("runner shutting down"));
                }
                let result = self
                    .translator
                    .translate(segment, &paragraph.text)
                    .await
                    .map_err(|e| {
                        warn!(paragraph = idx, "Translator error: {}", e);
                        Failure::new("Failed to translate segments")
                    })?;
                self.append(id, result, idx).await?;
            }
            if !self.renew(id).await {
                return Ok(Outcome::Abandoned("lease lost"));
            }
        }

        let owned = id.to_string();
        self.store
            .call(move |s| s.complete(&owned))
            .await
            .map_err(|e| {
                warn!("Failed to complete: {}", e);
                Failure::new("Failed to complete translation")
            })?;
        Ok(Outcome::Completed)
    }

    async fn segment_all(&self, paragraphs: &[SplitParagraph]) -> Result<Vec<Vec<String>>, Failure> {
        let mut plan = Vec::with_capacity(paragraphs.len());
        for paragraph in paragraphs {
            let segments = self
                .translator
                .segment(&paragraph.text)
                .await
                .map_err(|e| Failure(format!("Failed to segment: {}", truncate(&e.to_string()))))?;
            plan.push(
                segments
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }
        Ok(plan)
    }

    /// Decides which paragraphs already hold a full set of results, clears
    /// the ones that were only partly written, and sets the counters.
    async fn prepare(
        &self,
        id: &str,
        paragraphs: &[SplitParagraph],
        plan: &[Vec<String>],
        total: usize,
    ) -> Result<Vec<bool>, StoreError> {
        let owned = id.to_string();
        let counts = self
            .store
            .call(move |s| s.paragraph_segment_counts(&owned))
            .await?;

        let mut kept = vec![false; plan.len()];
        let mut partial = Vec::new();
        for (idx, segments) in plan.iter().enumerate() {
            match counts.get(&idx).copied().unwrap_or(0) {
                0 => {}
                stored if stored == segments.len() => kept[idx] = true,
                _ => partial.push(idx),
            }
        }

        let metas: Vec<ParagraphMeta> = paragraphs
            .iter()
            .zip(plan)
            .map(|(paragraph, segments)| ParagraphMeta {
                planned_segments: Some(segments.len()),
                ..paragraph.meta()
            })
            .collect();
        let resume = kept.iter().any(|k| *k);
        let owned = id.to_string();
        self.store
            .call(move |s| {
                for idx in partial {
                    s.clear_paragraph_segments(&owned, idx)?;
                }
                if resume {
                    s.set_reprocessing(&owned, total, &metas).map(|_| ())
                } else {
                    s.set_processing(&owned, total, &metas)
                }
            })
            .await?;

        if resume {
            debug!(
                kept = kept.iter().filter(|k| **k).count(),
                "Resuming after stored paragraphs"
            );
        }
        Ok(kept)
    }

    async fn append(&self, id: &str, result: SegmentResult, paragraph_idx: usize) -> Result<(), Failure> {
        let owned = id.to_string();
        self.store
            .call(move |s| s.add_progress_segment(&owned, &result, paragraph_idx))
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("Failed to append segment: {}", e);
                Failure::new("Failed to update translation progress")
            })
    }

    /// Renews the lease. Transient store errors count as still held; the
    /// claim itself stays exclusive until the lease actually lapses.
    async fn renew(&self, id: &str) -> bool {
        let owned = id.to_string();
        let lease = self.lease_duration;
        match self.store.call(move |s| s.renew_lease(&owned, lease)).await {
            Ok(held) => held,
            Err(e) => {
                warn!("Lease renewal failed: {}", e);
                true
            }
        }
    }
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_DETAIL {
        return message.to_string();
    }
    let cut: String = message.chars().take(MAX_ERROR_DETAIL).collect();
    format!("{}...", cut)
}
