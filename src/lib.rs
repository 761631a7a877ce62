//! # clipgate
//!
//! Perceptual fingerprinting and blocklist matching for short video clips.
//!
//! ## Features
//!
//! - **Frame Sampling**: readiness-gated capture with grayscale reduction and burst averaging
//! - **Perceptual Hashing**: low-frequency DCT fingerprints robust to re-encoding and resizing
//! - **Similarity Matching**: Hamming-distance comparison with a runtime-tunable threshold
//! - **Quality Gating**: skewed fingerprints from blank or poster frames are rejected as unusable
//! - **Bounded Scheduling**: priority-ordered fingerprint jobs with per-job timeouts
//! - **Blocklist Registry**: in-memory view kept in sync with an external fingerprint store
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clipgate::{BlockOrigin, BlockRecord, BlockRegistry, ScanConfig, ScanEngine};
//! use std::sync::Arc;
//!
//! # fn main() -> clipgate::Result<()> {
//! let registry = Arc::new(BlockRegistry::new());
//! let engine = ScanEngine::new(&ScanConfig::default(), Arc::clone(&registry))?;
//!
//! let poster = image::open("poster.png").expect("readable image");
//! let fingerprint = engine.fingerprint_image(&poster);
//! if !fingerprint.is_trivial(4) {
//!     registry.insert(BlockRecord::new(fingerprint, BlockOrigin::Manual));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod sampler;

// Re-export commonly used types
pub use config::ScanConfig;
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, PerceptualHasher};
pub use matcher::{BestMatch, SimilarityMatcher};
pub use pipeline::{NoSignalReason, ScanEngine, ScanOutcome};
pub use queue::JobQueue;
pub use registry::{
    BlockOrigin, BlockRecord, BlockRegistry, FingerprintStore, RegistryMatch, StoreChange,
};
pub use sampler::{
    AveragedMatrix, FrameAccumulator, FrameMatrix, FrameSampler, FrameSource, ReadyState,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
