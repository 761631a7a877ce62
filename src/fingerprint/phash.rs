//! Perceptual hashing via the low-frequency discrete cosine spectrum.
//!
//! The hasher projects an averaged intensity matrix onto its lowest spatial
//! frequencies, which survive re-encoding, minor resizing, and frame-rate
//! differences, and derives one bit per coefficient against the block
//! median. Monotonic brightness shifts move only the DC term, so the bit
//! pattern is stable under them to first order.

use std::f64::consts::PI;

use super::{Fingerprint, BLOCK_SIZE, FINGERPRINT_BITS};
use crate::sampler::{AveragedMatrix, MATRIX_SIZE};

/// Derives fingerprints from averaged intensity matrices.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerceptualHasher;

impl PerceptualHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hash a matrix into its fixed-length fingerprint.
    ///
    /// Pure and deterministic: identical matrices always produce identical
    /// bits.
    pub fn hash(&self, matrix: &AveragedMatrix) -> Fingerprint {
        let block = low_frequency_block(matrix);

        // Row-major over the block, skipping the DC term at (0, 0).
        let mut coefficients = Vec::with_capacity(FINGERPRINT_BITS);
        for u in 0..BLOCK_SIZE {
            for v in 0..BLOCK_SIZE {
                if u == 0 && v == 0 {
                    continue;
                }
                coefficients.push(block[u][v]);
            }
        }

        let mut sorted = coefficients.clone();
        sorted.sort_by(f64::total_cmp);
        let median = sorted[sorted.len() / 2];

        let bits = coefficients.iter().map(|&c| c > median).collect();
        Fingerprint::from_bits(bits)
    }
}

/// Top-left `BLOCK_SIZE`×`BLOCK_SIZE` corner of the 2D DCT-II spectrum.
///
/// Direct evaluation of the separable type-II formula with orthonormal
/// scaling: coefficient (u, v) = (2/S) · α(u) · α(v) · Σ p(x, y) ·
/// cos((2x+1)uπ/2S) · cos((2y+1)vπ/2S), with α(0) = 1/√2 and α(·) = 1
/// otherwise. Only the low-frequency corner is evaluated; a faster
/// transform must not change the bit output.
fn low_frequency_block(matrix: &AveragedMatrix) -> [[f64; BLOCK_SIZE]; BLOCK_SIZE] {
    let size = MATRIX_SIZE;
    let mut block = [[0.0f64; BLOCK_SIZE]; BLOCK_SIZE];

    for (u, row) in block.iter_mut().enumerate() {
        for (v, coefficient) in row.iter_mut().enumerate() {
            let mut sum = 0.0;
            for x in 0..size {
                let cos_u = (((2 * x + 1) as f64) * u as f64 * PI / (2.0 * size as f64)).cos();
                for y in 0..size {
                    let cos_v = (((2 * y + 1) as f64) * v as f64 * PI / (2.0 * size as f64)).cos();
                    sum += matrix.get(x, y) as f64 * cos_u * cos_v;
                }
            }

            let alpha_u = if u == 0 { 1.0 / 2.0f64.sqrt() } else { 1.0 };
            let alpha_v = if v == 0 { 1.0 / 2.0f64.sqrt() } else { 1.0 };
            *coefficient = 2.0 / size as f64 * alpha_u * alpha_v * sum;
        }
    }

    block
}
