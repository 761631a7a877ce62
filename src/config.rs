//! Runtime configuration for the fingerprinting pipeline.

use crate::matcher::DEFAULT_THRESHOLD;
use crate::queue::{MAX_CONCURRENT, MIN_CONCURRENT};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Tunable knobs for sampling, matching, and scheduling.
///
/// All fields map to user-facing settings, so they are plain data with
/// serde support; hosts deserialize them from whatever settings surface
/// they own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Maximum Hamming distance still treated as a match
    pub hamming_threshold: u32,
    /// Number of frames averaged into one fingerprint
    pub frames_to_capture: u32,
    /// Delay between captures when the source offers no frame signal
    pub frame_delay_ms: u64,
    /// Simultaneously active fingerprint jobs, within 1..=10
    pub max_concurrent: usize,
    /// Per-job timeout for queued fingerprint work
    pub job_timeout_ms: u64,
    /// Minimum count of ones and of zeros for a fingerprint to be usable
    pub min_ones_zeros: u32,
    /// How long to wait for a source to become ready before giving up
    pub ready_timeout_ms: u64,
    /// Upper bound in seconds for the poster-frame seek offset
    pub seek_cap_secs: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            hamming_threshold: DEFAULT_THRESHOLD,
            frames_to_capture: 3,
            frame_delay_ms: 120,
            max_concurrent: 3,
            job_timeout_ms: 5000,
            min_ones_zeros: 4,
            ready_timeout_ms: 4000,
            seek_cap_secs: 3.0,
        }
    }
}

impl ScanConfig {
    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CONCURRENT..=MAX_CONCURRENT).contains(&self.max_concurrent) {
            return Err(Error::Config {
                reason: format!(
                    "max_concurrent must be within {}..={}, got {}",
                    MIN_CONCURRENT, MAX_CONCURRENT, self.max_concurrent
                ),
            });
        }

        if self.frames_to_capture == 0 {
            return Err(Error::Config {
                reason: "frames_to_capture must be at least 1".to_string(),
            });
        }

        if self.job_timeout_ms == 0 {
            return Err(Error::Config {
                reason: "job_timeout_ms must be non-zero".to_string(),
            });
        }

        if !self.seek_cap_secs.is_finite() || self.seek_cap_secs < 0.0 {
            return Err(Error::Config {
                reason: format!("seek_cap_secs must be a non-negative number, got {}", self.seek_cap_secs),
            });
        }

        Ok(())
    }

    /// Load config from a file, falling back to defaults when it is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = fs::read_to_string(path)
                .map_err(|e| Error::Config { reason: format!("Failed to read config file: {}", e) })?;

            let config: Self = serde_yaml::from_str(&content)
                .map_err(|e| Error::Config { reason: format!("Failed to parse config file: {}", e) })?;

            config.validate()?;
            Ok(config)
        } else {
            debug!("Config file not found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::Config { reason: format!("Failed to serialize config: {}", e) })?;

        fs::write(path, content)?;
        Ok(())
    }
}
