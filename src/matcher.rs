//! Hamming-distance similarity matching between fingerprints.

use crate::fingerprint::Fingerprint;

/// Default match threshold in bits, out of the 63-bit fingerprint
pub const DEFAULT_THRESHOLD: u32 = 12;

/// Hamming distance between two fingerprints.
///
/// Counts differing bits over the common prefix, plus one per bit of length
/// difference: fingerprints from mismatched schemes compare as far apart
/// instead of being silently truncated. Symmetric in its arguments.
pub fn distance(a: &Fingerprint, b: &Fingerprint) -> u32 {
    let differing = a
        .bits()
        .iter()
        .zip(b.bits())
        .filter(|(x, y)| x != y)
        .count();
    let length_gap = a.len().abs_diff(b.len());
    (differing + length_gap) as u32
}

/// Minimum-distance candidate found by [`SimilarityMatcher::best_match`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestMatch<'a> {
    pub fingerprint: &'a Fingerprint,
    pub distance: u32,
}

/// Compares candidate fingerprints against a tunable distance threshold.
///
/// The threshold maps to a user-facing sensitivity setting, so it stays
/// adjustable at runtime rather than being baked in.
#[derive(Debug, Clone)]
pub struct SimilarityMatcher {
    threshold: u32,
}

impl SimilarityMatcher {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: u32) {
        self.threshold = threshold;
    }

    /// True when the two fingerprints are within the threshold, inclusive.
    pub fn is_match(&self, a: &Fingerprint, b: &Fingerprint) -> bool {
        distance(a, b) <= self.threshold
    }

    /// Linear scan for the closest candidate regardless of threshold.
    ///
    /// Ties keep the first candidate encountered in iteration order; an
    /// empty candidate set yields `None`.
    pub fn best_match<'a, I>(&self, target: &Fingerprint, candidates: I) -> Option<BestMatch<'a>>
    where
        I: IntoIterator<Item = &'a Fingerprint>,
    {
        let mut best: Option<BestMatch<'a>> = None;
        for candidate in candidates {
            let candidate_distance = distance(target, candidate);
            let closer = best
                .as_ref()
                .map_or(true, |current| candidate_distance < current.distance);
            if closer {
                best = Some(BestMatch {
                    fingerprint: candidate,
                    distance: candidate_distance,
                });
            }
        }
        best
    }
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FINGERPRINT_BITS;
    use pretty_assertions::assert_eq;

    fn fingerprint_from(pattern: &[usize]) -> Fingerprint {
        let mut bits = vec![false; FINGERPRINT_BITS];
        for &index in pattern {
            bits[index] = true;
        }
        Fingerprint::from_bits(bits)
    }

    #[test]
    fn test_distance_identity() {
        let fingerprint = fingerprint_from(&[0, 5, 17, 40]);
        assert_eq!(distance(&fingerprint, &fingerprint), 0);
    }

    #[test]
    fn test_distance_symmetry() {
        let a = fingerprint_from(&[1, 2, 3, 30]);
        let b = fingerprint_from(&[2, 3, 4, 50, 60]);
        assert_eq!(distance(&a, &b), distance(&b, &a));
    }

    #[test]
    fn test_distance_counts_differing_bits() {
        let a = fingerprint_from(&[0, 1, 2]);
        let b = fingerprint_from(&[1, 2, 3, 4]);
        // Bits 0, 3, 4 differ.
        assert_eq!(distance(&a, &b), 3);
    }

    #[test]
    fn test_distance_penalizes_length_mismatch() {
        let long = fingerprint_from(&[0, 1]);
        let short = Fingerprint::from_bits(vec![true, true, false, false]);
        // Common prefix of 4 bits agrees entirely; the remaining 59 bits of
        // the longer fingerprint count as distance.
        assert_eq!(distance(&long, &short), (FINGERPRINT_BITS - 4) as u32);
        assert_eq!(distance(&short, &long), (FINGERPRINT_BITS - 4) as u32);
    }

    #[test]
    fn test_is_match_threshold_is_inclusive() {
        let a = fingerprint_from(&[0, 1, 2, 3]);
        let b = fingerprint_from(&[4, 5, 6, 7]);
        let gap = distance(&a, &b);

        assert!(SimilarityMatcher::new(gap).is_match(&a, &b));
        assert!(!SimilarityMatcher::new(gap - 1).is_match(&a, &b));
    }

    #[test]
    fn test_threshold_monotonicity() {
        let a = fingerprint_from(&[0, 10, 20]);
        let b = fingerprint_from(&[0, 11, 21]);
        let gap = distance(&a, &b);

        for threshold in gap..gap + 5 {
            assert!(SimilarityMatcher::new(threshold).is_match(&a, &b));
        }
    }

    #[test]
    fn test_set_threshold_changes_outcome() {
        let a = fingerprint_from(&[0]);
        let b = fingerprint_from(&[1]);

        let mut matcher = SimilarityMatcher::new(0);
        assert!(!matcher.is_match(&a, &b));

        matcher.set_threshold(2);
        assert!(matcher.is_match(&a, &b));
    }

    #[test]
    fn test_best_match_returns_minimum_distance() {
        let target = fingerprint_from(&[0, 1, 2]);
        let near = fingerprint_from(&[0, 1, 3]);
        let far = fingerprint_from(&[10, 20, 30, 40]);
        let candidates = [far.clone(), near.clone()];

        let matcher = SimilarityMatcher::default();
        let best = matcher.best_match(&target, candidates.iter()).unwrap();
        assert_eq!(best.fingerprint, &near);
        assert_eq!(best.distance, 2);
    }

    #[test]
    fn test_best_match_tie_keeps_first_encountered() {
        let target = fingerprint_from(&[0]);
        let first = fingerprint_from(&[1]);
        let second = fingerprint_from(&[2]);
        // Both candidates are at distance 2.
        let candidates = [first.clone(), second];

        let matcher = SimilarityMatcher::default();
        let best = matcher.best_match(&target, candidates.iter()).unwrap();
        assert_eq!(best.fingerprint, &first);
    }

    #[test]
    fn test_best_match_empty_candidates() {
        let target = fingerprint_from(&[0]);
        let matcher = SimilarityMatcher::default();
        assert!(matcher.best_match(&target, std::iter::empty()).is_none());
    }
}
