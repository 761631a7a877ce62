//! End-to-end scan pipeline: sample, hash, gate, match.
//!
//! [`ScanEngine`] owns the sampler, hasher, matcher, and scheduler, and runs
//! each scan as a queued job against a shared [`BlockRegistry`]. Scans are
//! single attempts; callers wanting retry-with-backoff invoke `scan` again
//! on top of the structured outcome.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::fingerprint::{Fingerprint, PerceptualHasher};
use crate::matcher::SimilarityMatcher;
use crate::queue::JobQueue;
use crate::registry::{BlockRegistry, RegistryMatch};
use crate::sampler::{AveragedMatrix, FrameMatrix, FrameSampler, FrameSource};
use crate::Result;

/// Why a scan produced no usable fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSignalReason {
    /// The source never became ready or every capture failed
    NoFrames,
    /// The hash was too skewed to be discriminative
    TrivialFingerprint,
}

/// Outcome of scanning one clip against the blocklist.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// The clip is within the match threshold of a blocked record
    Blocked { matched: RegistryMatch },
    /// A usable fingerprint was produced and nothing blocked is close
    Clean { fingerprint: Fingerprint },
    /// No usable fingerprint; defined outcome, not an error
    NoSignal { reason: NoSignalReason },
}

/// Facade owning the fingerprinting pipeline and its scheduler.
pub struct ScanEngine {
    sampler: FrameSampler,
    hasher: PerceptualHasher,
    matcher: Arc<RwLock<SimilarityMatcher>>,
    registry: Arc<BlockRegistry>,
    queue: JobQueue<ScanOutcome>,
    min_ones_zeros: u32,
}

impl ScanEngine {
    /// Build an engine over a shared registry. Fails fast on an invalid
    /// configuration.
    pub fn new(config: &ScanConfig, registry: Arc<BlockRegistry>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            sampler: FrameSampler::new(config),
            hasher: PerceptualHasher::new(),
            matcher: Arc::new(RwLock::new(SimilarityMatcher::new(config.hamming_threshold))),
            registry,
            queue: JobQueue::new(
                config.max_concurrent,
                Duration::from_millis(config.job_timeout_ms),
            ),
            min_ones_zeros: config.min_ones_zeros,
        })
    }

    /// The registry this engine matches against.
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Adjust the match threshold; applies to scans settling from now on.
    pub fn set_match_threshold(&self, threshold: u32) {
        self.matcher
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_threshold(threshold);
    }

    /// Forwarded to the scheduler; out-of-range values are ignored.
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        self.queue.set_max_concurrent(max_concurrent);
    }

    /// Reject all scans that have not started yet.
    pub fn clear_pending(&self, reason: &str) {
        self.queue.clear_pending(reason);
    }

    /// Resolve once no scan is queued or in flight.
    pub async fn wait_for_completion(&self) {
        self.queue.wait_for_completion().await;
    }

    /// Queue a scan of `source` against the blocklist.
    ///
    /// The receiver settles with a [`ScanOutcome`], or with an error for a
    /// timed-out, failed, or rejected job; the error variants stay
    /// distinguishable so callers can pick different retry policies.
    pub fn scan<S>(&self, mut source: S, priority: i32) -> oneshot::Receiver<Result<ScanOutcome>>
    where
        S: FrameSource + 'static,
    {
        let job_id = Uuid::new_v4().to_string();
        let sampler = self.sampler.clone();
        let hasher = self.hasher;
        let matcher = Arc::clone(&self.matcher);
        let registry = Arc::clone(&self.registry);
        let min_ones_zeros = self.min_ones_zeros;

        self.queue.enqueue(job_id, priority, async move {
            let Some(matrix) = sampler.sample(&mut source).await else {
                debug!("no frames captured, reporting no-signal");
                return Ok(ScanOutcome::NoSignal {
                    reason: NoSignalReason::NoFrames,
                });
            };

            let fingerprint = hasher.hash(&matrix);
            if fingerprint.is_trivial(min_ones_zeros) {
                debug!(
                    "trivial fingerprint ({} ones / {} zeros), reporting no-signal",
                    fingerprint.ones(),
                    fingerprint.zeros()
                );
                return Ok(ScanOutcome::NoSignal {
                    reason: NoSignalReason::TrivialFingerprint,
                });
            }

            let matcher = matcher
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            match registry.find_match(&fingerprint, &matcher) {
                Some(matched) => {
                    info!(
                        "clip matches blocked record at distance {} (threshold {})",
                        matched.distance,
                        matcher.threshold()
                    );
                    Ok(ScanOutcome::Blocked { matched })
                }
                None => Ok(ScanOutcome::Clean { fingerprint }),
            }
        })
    }

    /// Fingerprint a single decoded still outside the scheduler.
    ///
    /// The result is not quality-gated; gate with
    /// [`Fingerprint::is_trivial`] before storing or matching it.
    pub fn fingerprint_image(&self, image: &DynamicImage) -> Fingerprint {
        let frame = FrameMatrix::from_image(image);
        self.hasher.hash(&AveragedMatrix::from(frame))
    }
}
