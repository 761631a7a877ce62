//! Frame sampling: readiness gating, capture, grayscale reduction, averaging.
//!
//! The sampler captures a short burst of frames from a [`FrameSource`],
//! reduces each to a fixed-size luma grid, and averages the burst into one
//! denoised matrix for hashing. A single failed capture is skipped; only a
//! burst with zero usable frames yields nothing.

use async_trait::async_trait;
use image::DynamicImage;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::config::ScanConfig;
use crate::{Error, Result};

/// Edge length of the sampled intensity grid
pub const MATRIX_SIZE: usize = 32;

/// Intensity values in one matrix
const PIXELS: usize = MATRIX_SIZE * MATRIX_SIZE;

/// Poll interval while waiting for a source to become ready
const READY_POLL_MS: u64 = 25;

/// Fraction of the clip duration used as the poster-frame seek offset
const SEEK_FRACTION: f64 = 0.1;

/// Readiness reported by a frame source, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    /// Nothing is known about the source yet
    Empty,
    /// Dimensions and duration are known, but no frame is decodable
    Metadata,
    /// A frame is available at the current position
    CurrentFrame,
    /// Enough data is buffered to keep presenting frames
    Buffered,
}

/// A drawable video source supplying frames to the sampler.
///
/// Implementations wrap whatever actually holds the pixels: a media
/// element, a decoder, a test fixture. Every call may be refused by the
/// underlying source; `draw_frame` failures are per-frame events, not
/// fatal ones.
#[async_trait]
pub trait FrameSource: Send {
    /// Current readiness of the source.
    fn ready_state(&self) -> ReadyState;

    /// Native dimensions of the source in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Total duration in seconds, if known.
    fn duration(&self) -> Option<f64>;

    /// Draw the current frame scaled to `side`×`side`, as tightly packed
    /// RGBA bytes. Fails for protected or otherwise undrawable content.
    fn draw_frame(&mut self, side: u32) -> Result<Vec<u8>>;

    /// Resolves when the source presents a new frame. Sources without a
    /// frame signal keep the default, which never resolves; the sampler's
    /// inter-frame delay then paces the captures on its own.
    async fn next_frame(&mut self) {
        std::future::pending::<()>().await
    }

    /// Whether the source is currently muted.
    fn is_muted(&self) -> bool;

    /// Mute or unmute the source.
    fn set_muted(&mut self, muted: bool);

    /// Current playback position in seconds.
    fn position(&self) -> f64;

    /// Best-effort seek; returns false when the source cannot seek.
    fn seek(&mut self, position_secs: f64) -> bool;
}

/// One captured frame reduced to a `MATRIX_SIZE`×`MATRIX_SIZE` grid of
/// luma intensities (ITU-R BT.601 weights).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMatrix {
    intensities: Vec<u8>,
}

impl FrameMatrix {
    /// Build a matrix from row-major luma values.
    pub fn from_luma(intensities: Vec<u8>) -> Result<Self> {
        if intensities.len() != PIXELS {
            return Err(Error::InvalidMatrix {
                expected: PIXELS,
                actual: intensities.len(),
            });
        }
        Ok(Self { intensities })
    }

    /// Reduce tightly packed RGBA samples to luma.
    pub fn from_rgba(rgba: &[u8]) -> Result<Self> {
        if rgba.len() != PIXELS * 4 {
            return Err(Error::InvalidMatrix {
                expected: PIXELS * 4,
                actual: rgba.len(),
            });
        }

        let intensities = rgba
            .chunks_exact(4)
            .map(|px| luma(px[0], px[1], px[2]))
            .collect();
        Ok(Self { intensities })
    }

    /// Reduce a decoded still image: exact resize to the sample grid, then
    /// luma reduction.
    pub fn from_image(image: &DynamicImage) -> Self {
        let side = MATRIX_SIZE as u32;
        let resized = image.resize_exact(side, side, image::imageops::FilterType::Lanczos3);
        let rgba = resized.to_rgba8();

        let intensities = rgba.pixels().map(|p| luma(p.0[0], p.0[1], p.0[2])).collect();
        Self { intensities }
    }

    /// Intensity at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.intensities[y * MATRIX_SIZE + x]
    }

    /// Row-major intensity values.
    pub fn as_slice(&self) -> &[u8] {
        &self.intensities
    }
}

/// Luminance-weighted grayscale per ITU-R BT.601
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

/// Element-wise mean of one or more frame matrices, rounded to integer
/// intensity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AveragedMatrix {
    intensities: Vec<u8>,
}

impl AveragedMatrix {
    /// Build a matrix directly from row-major luma values.
    pub fn from_luma(intensities: Vec<u8>) -> Result<Self> {
        if intensities.len() != PIXELS {
            return Err(Error::InvalidMatrix {
                expected: PIXELS,
                actual: intensities.len(),
            });
        }
        Ok(Self { intensities })
    }

    /// Intensity at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.intensities[y * MATRIX_SIZE + x]
    }

    /// Row-major intensity values.
    pub fn as_slice(&self) -> &[u8] {
        &self.intensities
    }
}

impl From<FrameMatrix> for AveragedMatrix {
    /// A single frame averages to itself.
    fn from(frame: FrameMatrix) -> Self {
        Self {
            intensities: frame.intensities,
        }
    }
}

/// Element-wise accumulator over captured frames.
///
/// `finish` refuses to synthesize a matrix out of zero frames; an empty
/// accumulator yields `None`, never a grid of zeros.
#[derive(Debug)]
pub struct FrameAccumulator {
    sums: Vec<u64>,
    frames: u32,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            sums: vec![0; PIXELS],
            frames: 0,
        }
    }

    /// Add one captured frame to the running sums.
    pub fn add(&mut self, frame: &FrameMatrix) {
        for (sum, &value) in self.sums.iter_mut().zip(frame.intensities.iter()) {
            *sum += value as u64;
        }
        self.frames += 1;
    }

    /// Number of frames accumulated so far.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Average the accumulated frames, rounding to the nearest intensity.
    pub fn finish(self) -> Option<AveragedMatrix> {
        if self.frames == 0 {
            return None;
        }

        let n = self.frames as u64;
        let intensities = self.sums.iter().map(|&sum| ((sum + n / 2) / n) as u8).collect();
        Some(AveragedMatrix { intensities })
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Captures a burst of frames from a source and averages them into a
/// single denoised intensity matrix.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    frames_to_capture: u32,
    frame_delay: Duration,
    ready_timeout: Duration,
    seek_cap_secs: f64,
}

impl FrameSampler {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            frames_to_capture: config.frames_to_capture,
            frame_delay: Duration::from_millis(config.frame_delay_ms),
            ready_timeout: Duration::from_millis(config.ready_timeout_ms),
            seek_cap_secs: config.seek_cap_secs,
        }
    }

    /// Sample and average frames from `source`.
    ///
    /// Returns `None` when the source never becomes ready or when no frame
    /// at all could be captured. The source's muted flag is restored on
    /// every path out of this call.
    pub async fn sample<S: FrameSource>(&self, source: &mut S) -> Option<AveragedMatrix> {
        if !self.wait_until_ready(source).await {
            debug!(
                "source not ready within {}ms, treating as zero usable frames",
                self.ready_timeout.as_millis()
            );
            return None;
        }

        let was_muted = source.is_muted();
        source.set_muted(true);

        let averaged = self.capture_burst(source).await;

        source.set_muted(was_muted);
        averaged
    }

    /// Poll the source until a frame is decodable or the bounded wait runs
    /// out.
    async fn wait_until_ready<S: FrameSource>(&self, source: &mut S) -> bool {
        let deadline = Instant::now() + self.ready_timeout;
        while source.ready_state() < ReadyState::CurrentFrame {
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(READY_POLL_MS)).await;
        }
        true
    }

    async fn capture_burst<S: FrameSource>(&self, source: &mut S) -> Option<AveragedMatrix> {
        self.seek_past_poster(source).await;

        let mut accumulator = FrameAccumulator::new();
        for index in 0..self.frames_to_capture {
            if index > 0 {
                // Whichever settles first paces the next capture: a frame
                // advance from the source or the configured delay.
                let _ = timeout(self.frame_delay, source.next_frame()).await;
            }

            match source.draw_frame(MATRIX_SIZE as u32) {
                Ok(rgba) => match FrameMatrix::from_rgba(&rgba) {
                    Ok(frame) => accumulator.add(&frame),
                    Err(err) => warn!("frame {} rejected: {}", index, err),
                },
                Err(err) => warn!("frame {} capture failed: {}", index, err),
            }
        }

        let captured = accumulator.frames();
        if captured < self.frames_to_capture {
            debug!("captured {}/{} frames", captured, self.frames_to_capture);
        }
        accumulator.finish()
    }

    /// Nudge the source off t=0, where a static poster frame usually sits.
    /// Seek refusal is non-fatal; capture proceeds at the current position.
    async fn seek_past_poster<S: FrameSource>(&self, source: &mut S) {
        let Some(duration) = source.duration() else {
            return;
        };
        if !duration.is_finite() || duration <= 0.0 {
            return;
        }

        let offset = (duration * SEEK_FRACTION).min(self.seek_cap_secs);
        if source.position() >= offset {
            return;
        }

        if source.seek(offset) {
            // Give the seek one frame interval to settle before capturing.
            let _ = timeout(self.frame_delay, source.next_frame()).await;
        } else {
            debug!("seek to {:.2}s declined, capturing at current position", offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Scriptable frame source: yields a fixed sequence of draw results.
    struct StubSource {
        ready: bool,
        frames: Vec<Result<Vec<u8>>>,
        cursor: usize,
        muted: bool,
        position: f64,
        duration: Option<f64>,
        seekable: bool,
        seeked_to: Option<f64>,
    }

    impl StubSource {
        fn with_frames(frames: Vec<Result<Vec<u8>>>) -> Self {
            Self {
                ready: true,
                frames,
                cursor: 0,
                muted: false,
                position: 0.0,
                duration: Some(20.0),
                seekable: true,
                seeked_to: None,
            }
        }
    }

    #[async_trait]
    impl FrameSource for StubSource {
        fn ready_state(&self) -> ReadyState {
            if self.ready {
                ReadyState::CurrentFrame
            } else {
                ReadyState::Metadata
            }
        }

        fn dimensions(&self) -> (u32, u32) {
            (640, 360)
        }

        fn duration(&self) -> Option<f64> {
            self.duration
        }

        fn draw_frame(&mut self, _side: u32) -> Result<Vec<u8>> {
            let frame = match self.frames.get_mut(self.cursor) {
                Some(slot) => std::mem::replace(
                    slot,
                    Err(Error::Capture {
                        reason: "frame consumed".to_string(),
                    }),
                ),
                None => Err(Error::Capture {
                    reason: "no more frames".to_string(),
                }),
            };
            self.cursor += 1;
            frame
        }

        fn is_muted(&self) -> bool {
            self.muted
        }

        fn set_muted(&mut self, muted: bool) {
            self.muted = muted;
        }

        fn position(&self) -> f64 {
            self.position
        }

        fn seek(&mut self, position_secs: f64) -> bool {
            if !self.seekable {
                return false;
            }
            self.position = position_secs;
            self.seeked_to = Some(position_secs);
            true
        }
    }

    fn rgba_frame(value: u8) -> Vec<u8> {
        let mut frame = Vec::with_capacity(PIXELS * 4);
        for _ in 0..PIXELS {
            frame.extend_from_slice(&[value, value, value, 255]);
        }
        frame
    }

    fn quick_config() -> ScanConfig {
        let mut config = ScanConfig::default();
        config.frame_delay_ms = 1;
        config.ready_timeout_ms = 200;
        config
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 149);
        assert_eq!(luma(0, 0, 255), 29);
        assert_eq!(luma(255, 255, 255), 255);
    }

    #[test]
    fn test_from_rgba_rejects_wrong_length() {
        let err = FrameMatrix::from_rgba(&[0u8; 12]).unwrap_err();
        assert!(matches!(err, Error::InvalidMatrix { expected, actual }
            if expected == PIXELS * 4 && actual == 12));
    }

    #[test]
    fn test_from_luma_rejects_wrong_length() {
        assert!(FrameMatrix::from_luma(vec![0; 7]).is_err());
        assert!(FrameMatrix::from_luma(vec![0; PIXELS]).is_ok());
    }

    #[test]
    fn test_accumulator_empty_yields_none() {
        assert!(FrameAccumulator::new().finish().is_none());
    }

    #[test]
    fn test_accumulator_averages_with_rounding() {
        let mut accumulator = FrameAccumulator::new();
        accumulator.add(&FrameMatrix::from_luma(vec![10; PIXELS]).unwrap());
        accumulator.add(&FrameMatrix::from_luma(vec![11; PIXELS]).unwrap());

        let averaged = accumulator.finish().unwrap();
        // (10 + 11 + 1) / 2 rounds up to 11.
        assert!(averaged.as_slice().iter().all(|&v| v == 11));
    }

    #[test]
    fn test_averaging_reduces_noise() {
        let base = vec![100u8; PIXELS];

        // Three samples of the base plus deterministic zero-mean noise.
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut noisy = |_: usize| -> Vec<u8> {
            (0..PIXELS)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    if (state >> 33) & 1 == 0 {
                        94
                    } else {
                        106
                    }
                })
                .collect()
        };

        let samples: Vec<Vec<u8>> = (0..3).map(&mut noisy).collect();

        let mut accumulator = FrameAccumulator::new();
        for sample in &samples {
            accumulator.add(&FrameMatrix::from_luma(sample.clone()).unwrap());
        }
        let averaged = accumulator.finish().unwrap();

        let sad = |values: &[u8]| -> u64 {
            values
                .iter()
                .zip(base.iter())
                .map(|(&a, &b)| (a as i64 - b as i64).unsigned_abs())
                .sum()
        };

        let averaged_sad = sad(averaged.as_slice());
        for sample in &samples {
            assert!(averaged_sad < sad(sample));
        }
    }

    #[tokio::test]
    async fn test_sample_averages_captured_frames() {
        let mut source = StubSource::with_frames(vec![
            Ok(rgba_frame(10)),
            Ok(rgba_frame(20)),
            Ok(rgba_frame(30)),
        ]);

        let sampler = FrameSampler::new(&quick_config());
        let averaged = sampler.sample(&mut source).await.unwrap();

        assert!(averaged.as_slice().iter().all(|&v| v == 20));
        assert!(!source.is_muted());
        // 10% of the 20s duration, capped at the configured 3s.
        assert_eq!(source.seeked_to, Some(2.0));
    }

    #[tokio::test]
    async fn test_sample_skips_failed_captures() {
        let mut source = StubSource::with_frames(vec![
            Ok(rgba_frame(40)),
            Err(Error::Capture {
                reason: "protected content".to_string(),
            }),
            Ok(rgba_frame(60)),
        ]);

        let sampler = FrameSampler::new(&quick_config());
        let averaged = sampler.sample(&mut source).await.unwrap();

        assert!(averaged.as_slice().iter().all(|&v| v == 50));
    }

    #[tokio::test]
    async fn test_sample_with_zero_captures_yields_none() {
        let failed = || {
            Err(Error::Capture {
                reason: "tainted".to_string(),
            })
        };
        let mut source = StubSource::with_frames(vec![failed(), failed(), failed()]);

        let sampler = FrameSampler::new(&quick_config());
        assert!(sampler.sample(&mut source).await.is_none());
        assert!(!source.is_muted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_gives_up_on_never_ready_source() {
        let mut source = StubSource::with_frames(vec![Ok(rgba_frame(10))]);
        source.ready = false;

        let sampler = FrameSampler::new(&quick_config());
        assert!(sampler.sample(&mut source).await.is_none());
    }

    #[tokio::test]
    async fn test_sample_restores_prior_mute_state() {
        let mut source = StubSource::with_frames(vec![
            Ok(rgba_frame(5)),
            Ok(rgba_frame(5)),
            Ok(rgba_frame(5)),
        ]);
        source.muted = true;

        let sampler = FrameSampler::new(&quick_config());
        sampler.sample(&mut source).await.unwrap();
        assert!(source.is_muted());
    }

    #[tokio::test]
    async fn test_sample_survives_unseekable_source() {
        let mut source = StubSource::with_frames(vec![
            Ok(rgba_frame(90)),
            Ok(rgba_frame(90)),
            Ok(rgba_frame(90)),
        ]);
        source.seekable = false;

        let sampler = FrameSampler::new(&quick_config());
        let averaged = sampler.sample(&mut source).await.unwrap();
        assert!(averaged.as_slice().iter().all(|&v| v == 90));
        assert_eq!(source.seeked_to, None);
    }
}
