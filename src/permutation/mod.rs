//! Sample relabelings for the permutation null model
//!
//! A relabeling picks `r` of the `n` samples as a pseudo-reference set and one
//! of the remaining samples as the pseudo-treated sample, so there are
//! `C(n, r) * (n - r)` of them. Each one is addressed by an index in
//! `[0, bound)`: the reference combination is the `k / (n - r)`-th in
//! lexicographic order and the treated sample the `k % (n - r)`-th sample
//! outside it.

mod null;

pub use null::{generate_null, PermutedScores};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SspaError};
use crate::rng::RMersenneTwister;

/// Binomial coefficient C(n, k); `None` on overflow
pub fn binomial(n: u64, k: u64) -> Option<u64> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut result = 1u128;
    for i in 0..k as u128 {
        result = result.checked_mul(n as u128 - i)? / (i + 1);
    }
    u64::try_from(result).ok()
}

/// Number of distinct relabelings of `n_samples` with reference sets of
/// `reference_size` samples
pub fn permutation_bound(n_samples: usize, reference_size: usize) -> Result<u64> {
    if reference_size == 0 || reference_size >= n_samples {
        return Err(SspaError::InvalidDesign {
            reason: format!(
                "Cannot relabel {} samples with reference sets of {}",
                n_samples, reference_size
            ),
        });
    }
    let (n, r) = (n_samples as u64, reference_size as u64);
    binomial(n, r)
        .and_then(|c| c.checked_mul(n - r))
        .ok_or_else(|| SspaError::InvalidDesign {
            reason: format!("Relabelings of {} samples overflow a 64-bit index", n_samples),
        })
}

/// A pseudo-reference set and a pseudo-treated sample
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relabeling {
    /// Sorted sample indices
    pub reference: Vec<usize>,
    pub treated: usize,
}

/// The relabeling with index `k`
pub fn unrank(k: u64, n_samples: usize, reference_size: usize) -> Result<Relabeling> {
    let bound = permutation_bound(n_samples, reference_size)?;
    if k >= bound {
        return Err(SspaError::PermutationBound {
            generated: k + 1,
            bound,
        });
    }

    let (n, r) = (n_samples as u64, reference_size as u64);
    let slots = n - r;
    let mut rank = k / slots;
    let treated_slot = (k % slots) as usize;

    let mut reference = Vec::with_capacity(reference_size);
    let mut x = 0u64;
    for i in 0..r {
        loop {
            let count = binomial(n - x - 1, r - i - 1).unwrap_or(u64::MAX);
            if rank < count {
                reference.push(x as usize);
                x += 1;
                break;
            }
            rank -= count;
            x += 1;
        }
    }

    let treated = (0..n_samples)
        .filter(|s| !reference.contains(s))
        .nth(treated_slot)
        .ok_or_else(|| SspaError::PermutationBound {
            generated: k + 1,
            bound,
        })?;

    Ok(Relabeling { reference, treated })
}

/// Indices of the relabelings to evaluate, ascending
///
/// Every relabeling when `requested >= bound`, otherwise `requested`
/// distinct indices drawn with the seeded generator.
pub fn select_relabelings(bound: u64, requested: u64, seed: u32) -> Result<Vec<u64>> {
    let selected: Vec<u64> = if requested >= bound {
        (0..bound).collect()
    } else {
        RMersenneTwister::new(seed).sample_distinct(bound, requested)
    };
    if selected.len() as u64 > bound {
        return Err(SspaError::PermutationBound {
            generated: selected.len() as u64,
            bound,
        });
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(6, 3), Some(20));
        assert_eq!(binomial(12, 1), Some(12));
        assert_eq!(binomial(3, 5), Some(0));
        assert_eq!(binomial(200, 100), None);
    }

    #[test]
    fn test_bound_for_paired_design() {
        // 12 samples in 6 pairs: one reference per pair
        assert_eq!(permutation_bound(12, 1).unwrap(), 132);
        assert_eq!(permutation_bound(6, 3).unwrap(), 60);
        assert!(permutation_bound(3, 3).is_err());
        assert!(permutation_bound(3, 0).is_err());
    }

    #[test]
    fn test_unrank_enumerates_every_relabeling_once() {
        let bound = permutation_bound(5, 2).unwrap();
        let mut seen = std::collections::HashSet::new();
        for k in 0..bound {
            let relabeling = unrank(k, 5, 2).unwrap();
            assert_eq!(relabeling.reference.len(), 2);
            assert!(relabeling.reference.windows(2).all(|w| w[0] < w[1]));
            assert!(!relabeling.reference.contains(&relabeling.treated));
            assert!(seen.insert(relabeling));
        }
        assert_eq!(seen.len() as u64, bound);
    }

    #[test]
    fn test_unrank_lexicographic() {
        assert_eq!(
            unrank(0, 4, 2).unwrap(),
            Relabeling { reference: vec![0, 1], treated: 2 }
        );
        // Combination rank 3 is {1, 2}; second free sample is 3
        assert_eq!(
            unrank(7, 4, 2).unwrap(),
            Relabeling { reference: vec![1, 2], treated: 3 }
        );
    }

    #[test]
    fn test_unrank_beyond_bound() {
        assert!(matches!(
            unrank(132, 12, 1),
            Err(SspaError::PermutationBound { generated: 133, bound: 132 })
        ));
    }

    #[test]
    fn test_selection_never_exceeds_bound() {
        let all = select_relabelings(132, 1000, 123).unwrap();
        assert_eq!(all.len(), 132);

        let some = select_relabelings(132, 50, 123).unwrap();
        assert_eq!(some.len(), 50);
        assert!(some.iter().all(|&k| k < 132));
        assert_eq!(some, select_relabelings(132, 50, 123).unwrap());
    }
}
