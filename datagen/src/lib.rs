//! Generates the primary-key relation R and the foreign-key relation S
//! (uniform or Zipf-skewed) that the join core operates on.
//!
//! Each generator takes an explicit seed rather than reading from thread-
//! local or global RNG state, so that repeated `--repeat` runs in the
//! measurement harness (or a test) can reproduce the exact same input.

mod error;

pub use error::DataGenError;

use join_core::Tuple;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Zipf};

/// Fills `size` tuples with a uniformly random permutation of `[1,
/// size]`, the shape relation R always takes (its primary-key
/// invariant).
pub fn generate_primary_keys(size: u32, seed: u64) -> Vec<Tuple> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut keys: Vec<u32> = (1..=size).collect();
    keys.shuffle(&mut rng);
    keys.into_iter().map(|key| Tuple { key, payload: 0 }).collect()
}

/// Fills `s_size` tuples with foreign keys uniformly distributed over
/// `[1, r_size]`, built the same way the original generator does: full
/// permutations of `[1, r_size]` repeated `s_size / r_size` times, with
/// any remainder filled by a permutation of `[1, s_size % r_size]`
/// (a subset of R's key space, not a uniform sample of the tail --
/// preserved from the original rather than "fixed", since it doesn't
/// violate the foreign-key invariant and changing it would stop matching
/// the reference generator's output shape).
pub fn generate_uniform_foreign_keys(
    r_size: u32,
    s_size: u32,
    seed: u64,
) -> Result<Vec<Tuple>, DataGenError> {
    if r_size == 0 {
        return Err(DataGenError::EmptyPrimaryRelation);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(s_size as usize);

    let ratio = s_size / r_size;
    for _ in 0..ratio {
        let mut keys: Vec<u32> = (1..=r_size).collect();
        keys.shuffle(&mut rng);
        out.extend(keys.into_iter().map(|key| Tuple { key, payload: 0 }));
    }

    let remainder = s_size % r_size;
    if remainder > 0 {
        let mut keys: Vec<u32> = (1..=remainder).collect();
        keys.shuffle(&mut rng);
        out.extend(keys.into_iter().map(|key| Tuple { key, payload: 0 }));
    }

    Ok(out)
}

/// Fills `s_size` tuples with foreign keys following a Zipfian
/// distribution (skew parameter `z`) over a freshly shuffled permutation
/// of R's key space, so that the *identity* of the favored keys is
/// randomized rather than always being the low-numbered ones.
pub fn generate_zipf_foreign_keys(
    r_size: u32,
    s_size: u32,
    z: f64,
    seed: u64,
) -> Result<Vec<Tuple>, DataGenError> {
    if r_size == 0 {
        return Err(DataGenError::EmptyPrimaryRelation);
    }
    if !(z > 0.0) || !z.is_finite() {
        return Err(DataGenError::InvalidSkew {
            z,
            reason: "Zipf skew must be a finite value greater than zero".to_string(),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);

    let mut ranked_keys: Vec<u32> = (1..=r_size).collect();
    ranked_keys.shuffle(&mut rng);

    let zipf: Zipf<f64> = Zipf::new(r_size as f64, z).map_err(|e| DataGenError::InvalidSkew {
        z,
        reason: e.to_string(),
    })?;

    let out = (0..s_size)
        .map(|_| {
            let rank = zipf.sample(&mut rng) as usize; // 1-indexed rank
            Tuple {
                key: ranked_keys[rank - 1],
                payload: 0,
            }
        })
        .collect();

    Ok(out)
}

/// Dispatches to uniform or Zipf generation based on whether `skew` is
/// positive, mirroring the original generator's own branch.
pub fn generate_foreign_keys(
    r_size: u32,
    s_size: u32,
    skew: f64,
    seed: u64,
) -> Result<Vec<Tuple>, DataGenError> {
    if skew > 0.0 {
        generate_zipf_foreign_keys(r_size, s_size, skew, seed)
    } else {
        generate_uniform_foreign_keys(r_size, s_size, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn primary_keys_are_a_permutation() {
        let tuples = generate_primary_keys(10_000, 12345);
        let mut keys: Vec<u32> = tuples.iter().map(|t| t.key).collect();
        keys.sort_unstable();
        let expected: Vec<u32> = (1..=10_000).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn uniform_foreign_keys_are_always_in_range() {
        let r = generate_primary_keys(500, 1);
        let r_size = r.len() as u32;
        let s = generate_uniform_foreign_keys(r_size, 5_000, 2).unwrap();
        assert_eq!(s.len(), 5_000);
        for t in &s {
            assert!(t.key >= 1 && t.key <= r_size);
        }
    }

    #[test]
    fn zipf_foreign_keys_are_in_range_and_skewed() {
        let r_size = 1_000;
        let s = generate_zipf_foreign_keys(r_size, 50_000, 1.5, 7).unwrap();
        assert_eq!(s.len(), 50_000);
        for t in &s {
            assert!(t.key >= 1 && t.key <= r_size);
        }

        let mut counts = std::collections::HashMap::new();
        for t in &s {
            *counts.entry(t.key).or_insert(0u32) += 1;
        }
        let max_count = *counts.values().max().unwrap();
        // Under reasonable skew, the single most frequent key should
        // appear far more often than the uniform expectation.
        assert!(max_count as f64 > (s.len() as f64 / r_size as f64) * 5.0);
    }

    #[test]
    fn empty_primary_relation_is_rejected() {
        assert!(generate_uniform_foreign_keys(0, 100, 1).is_err());
        assert!(generate_zipf_foreign_keys(0, 100, 1.0, 1).is_err());
    }

    #[test]
    fn generators_are_deterministic_given_the_same_seed() {
        let a = generate_primary_keys(2_000, 42);
        let b = generate_primary_keys(2_000, 42);
        assert_eq!(a, b);

        let keys_a: HashSet<u32> = a.iter().map(|t| t.key).collect();
        assert_eq!(keys_a.len(), 2_000);
    }
}
