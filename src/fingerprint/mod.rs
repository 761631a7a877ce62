//! Fingerprint representation and quality gating.
//!
//! A fingerprint is the fixed-length binary signature derived from a clip's
//! low-frequency visual content. The quality gate rejects fingerprints whose
//! bit distribution is too skewed to discriminate anything (blank frames,
//! solid-color posters); a trivial fingerprint is an "insufficient signal"
//! outcome, not an error.

pub mod phash;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export main types
pub use phash::PerceptualHasher;

/// Edge length of the low-frequency coefficient block
pub const BLOCK_SIZE: usize = 8;

/// Bits in a fingerprint produced by the hasher; the DC term carries no bit
pub const FINGERPRINT_BITS: usize = BLOCK_SIZE * BLOCK_SIZE - 1;

/// Fixed-length binary signature of a clip's low-frequency content.
///
/// Serializes as a '0'/'1' string, which is also the form external stores
/// persist. Fingerprints of other lengths can exist (records written under
/// an older scheme); the matcher penalizes the length gap instead of
/// refusing to compare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint {
    bits: Vec<bool>,
}

impl Fingerprint {
    /// Wrap raw bits produced by a hasher.
    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The bits, in the hasher's fixed scan order.
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Count of set bits.
    pub fn ones(&self) -> usize {
        self.bits.iter().filter(|&&bit| bit).count()
    }

    /// Count of unset bits.
    pub fn zeros(&self) -> usize {
        self.bits.len() - self.ones()
    }

    /// Quality gate: true when the bit distribution is too skewed to be
    /// discriminative. The boundary is inclusive: exactly `min_ones_zeros`
    /// ones (or zeros) is still trivial.
    pub fn is_trivial(&self, min_ones_zeros: u32) -> bool {
        let min = min_ones_zeros as usize;
        self.ones() <= min || self.zeros() <= min
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &bit in &self.bits {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidFingerprint {
                reason: "empty bit string".to_string(),
            });
        }

        let bits = s
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(Error::InvalidFingerprint {
                    reason: format!("unexpected character '{}' in bit string", other),
                }),
            })
            .collect::<Result<Vec<bool>>>()?;

        Ok(Self { bits })
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_string()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}
