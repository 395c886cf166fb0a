//! In-place Cache-aware Partitioner (ICP).
//!
//! Re-orders a worker's sub-relation into contiguous runs of tuples that
//! share the low (or, under Model III, high) `radix_bits` of their key,
//! working block by block within a single auxiliary buffer sized to one
//! block -- never a second copy of the whole sub-relation.
//!
//! The trick that keeps this in-place: the first block's tuples are
//! scattered into a temporary buffer (`TmpBlock`) rather than back into
//! the array, which frees up the first block's space in the array for
//! the *second* block's scatter target; the second block's former space
//! then receives the third block, and so on. The very last block's
//! scatter target is therefore the space vacated by the first block, and
//! the temporary buffer is copied back in to fill the hole that's left,
//! which is exactly sized to the first block (all blocks but block 0 are
//! exactly `avg_block_size`; block 0 absorbs the one-tuple-per-block
//! remainder).
//!
//! ICP also runs the skew detector (see [`estimate_skew`]) on the first
//! block of S, since that is the cheapest point at which to decide
//! whether to abandon S-partitioning altogether.

use crate::sync::SBarrier;
use crate::types::{Block, BlockMeta, RadixConfig, RelationId, SkewThresholds, Tuple};
use std::sync::atomic::{AtomicU32, Ordering};

/// Target tuples per block: small enough that a block plus its
/// histogram and prefix-sum scratch comfortably fit a last-level cache,
/// matching the original program's constant.
pub const CHUNK_SIZE: u32 = (1 << 15) - 10;

fn lg_floor(n: u32) -> u32 {
    assert!(n >= 1);
    31 - n.leading_zeros()
}

fn lg_ceil(n: u32) -> u32 {
    assert!(n >= 1);
    let floor = lg_floor(n);
    floor + u32::from((1u32 << floor) != n)
}

fn div_ceil(a: u32, b: u32) -> u32 {
    (a / b) + u32::from(a % b > 0)
}

/// Counts, across all participating workers, how many have locally
/// observed high skew while sampling S's first block. Shared once per
/// join (constructed by the orchestrator, handed to every worker).
#[derive(Debug, Default)]
pub struct SkewState {
    high_skew_observed: AtomicU32,
}

impl SkewState {
    pub fn new() -> SkewState {
        SkewState::default()
    }
}

/// The upper-bits shift Model III (and IV) build uses to index a
/// key-indexed aggregate table directly, instead of masking R's low
/// partition bits: the same `lg_ceil(full_r_size) - r_bits - 1` ICP
/// itself computes internally when partitioning R under `S_bits == 0`.
/// Exposed so callers that drive ColBP III/IV directly (outside ICP's
/// own re-entry) can compute the same shift without duplicating it.
pub fn model_iii_shift(full_r_size: u32, r_bits: u32) -> u32 {
    lg_ceil(full_r_size) - r_bits - 1
}

/// Runs ICP over one worker's sub-relation tuples in place, returning the
/// block/sub-block position table that ColBP II/III/IV consume. Returns
/// an empty [`BlockMeta`] (zero blocks) when the current radix for this
/// relation is zero -- including when the skew detector switches S's
/// radix to zero mid-call.
///
/// `full_r_size`/`full_s_size` are the *whole-relation* sizes (not this
/// worker's share), needed for the Model III shift computation and the
/// skew detector's |S|/|R| precondition.
#[allow(clippy::too_many_arguments)]
pub fn icp(
    id: RelationId,
    tuples: &mut [Tuple],
    radix: &RadixConfig,
    skew: &SkewState,
    thresholds: &SkewThresholds,
    full_r_size: u32,
    full_s_size: u32,
    num_groups: u32,
    sbarrier: &SBarrier,
    tid: usize,
    step: &mut u8,
) -> BlockMeta {
    let radix_bits = match id {
        RelationId::R => radix.r(),
        RelationId::S => radix.s(),
    };
    if radix_bits == 0 {
        return BlockMeta::default();
    }

    let shift = if id == RelationId::R && radix.s() == 0 {
        lg_ceil(full_r_size) - radix.r() - 1
    } else {
        0
    };

    let fanout = 1u32 << radix_bits;
    let mask = fanout - 1;

    let n = tuples.len() as u32;
    let num_blocks = div_ceil(n, CHUNK_SIZE);
    let avg_block_size = n / num_blocks;
    let mut remainder = n % num_blocks;
    let first_block_size = avg_block_size + u32::from(remainder > 0);

    // Model IV forces one sub-block per block when coarsely partitioning S.
    let num_sub_blocks = if id == RelationId::S && radix.r() > radix.s() {
        1
    } else {
        num_groups
    };
    assert_eq!(
        fanout % num_sub_blocks,
        0,
        "fanout must divide evenly into the number of LLC groups"
    );
    let sub_block_partitions = fanout / num_sub_blocks;

    let mut pos: Vec<Vec<Block>> = (0..num_blocks)
        .map(|_| vec![Block::default(); num_sub_blocks as usize])
        .collect();

    let mut histo = vec![0u32; fanout as usize];
    let mut tmp_block: Vec<Tuple> = Vec::with_capacity(first_block_size as usize);

    // `directory` tracks where the *current* block's scatter target
    // starts: initially the temporary buffer, then the array position
    // vacated by the previous block.
    let mut directory_is_tmp = true;
    let mut directory_offset = 0usize; // only meaningful once directory_is_tmp is false

    let mut i = 0u32;
    let mut block = 0u32;
    while i < n {
        let from = i;
        let take_extra = remainder > 0;
        if take_extra {
            remainder -= 1;
        }
        let length = avg_block_size + u32::from(take_extra);
        let to = from + length;
        assert!(to <= n);
        assert!(block < num_blocks - 1 || to == n);

        for h in histo.iter_mut() {
            *h = 0;
        }
        for j in from..to {
            let h = ((tuples[j as usize].key >> shift) & mask) as usize;
            histo[h] += 1;
        }

        // Skew estimation happens once, on the first block of S, and
        // only when the user did not pin the radix manually.
        if id == RelationId::S && block == 0 && !radix.user_defined() {
            if let Some(new_bits) = estimate_skew(
                tid,
                &histo,
                first_block_size,
                radix,
                skew,
                thresholds,
                full_r_size,
                full_s_size,
                sbarrier,
                step,
            ) {
                if new_bits == 0 {
                    return BlockMeta::default();
                }
                // Radix changed but didn't land on zero: restart with
                // the freshly observed bit count (mirrors the original's
                // recursive re-entry into ICP for relation S).
                return icp(
                    id,
                    tuples,
                    radix,
                    skew,
                    thresholds,
                    full_r_size,
                    full_s_size,
                    num_groups,
                    sbarrier,
                    tid,
                    step,
                );
            }
        }

        // Prefix-sum the histogram in place.
        let mut accum = 0u32;
        for h in histo.iter_mut() {
            let count = *h;
            *h = accum;
            accum += count;
        }
        assert_eq!(histo[0], 0);

        // Record each sub-block's [start, end) in the reordered array.
        let block_offset = (if block == 0 { n } else { from }) - first_block_size;
        for m in 0..num_sub_blocks {
            let p = (m * sub_block_partitions) as usize;
            let q = p + sub_block_partitions as usize;
            let start = block_offset + histo[p];
            let end = block_offset + if q as u32 == fanout { length } else { histo[q] };
            pos[block as usize][m as usize] = Block { start, end };
        }

        // Scatter this block's tuples into the directory.
        if directory_is_tmp {
            tmp_block.resize(first_block_size as usize, Tuple { key: 0, payload: 0 });
            for j in from..to {
                let t = tuples[j as usize];
                let h = ((t.key >> shift) & mask) as usize;
                tmp_block[histo[h] as usize] = t;
                histo[h] += 1;
            }
        } else {
            for j in from..to {
                let t = tuples[j as usize];
                let h = ((t.key >> shift) & mask) as usize;
                tuples[directory_offset + histo[h] as usize] = t;
                histo[h] += 1;
            }
        }
        assert_eq!(histo[fanout as usize - 1], to - from);

        if directory_is_tmp {
            directory_is_tmp = false;
            directory_offset = 0;
        } else {
            directory_offset += histo[fanout as usize - 1] as usize;
        }

        i = to;
        block += 1;
    }

    assert_eq!(remainder, 0);
    assert_eq!(n as usize - directory_offset, first_block_size as usize);
    tuples[directory_offset..directory_offset + first_block_size as usize]
        .copy_from_slice(&tmp_block);

    BlockMeta { pos }
}

/// Samples the histogram of S's first block for skew, reports to the
/// shared counter, and -- if every worker agrees -- has worker 0 switch
/// the whole join to Model III (`S_bits := 0`, `R_bits := R_bits + 1`).
///
/// Returns `None` if no switch occurred (including when the |S|/|R|
/// precondition isn't met), `Some(new_s_bits)` if it did (always 0, kept
/// as an explicit value so the caller's re-entry logic reads naturally).
#[allow(clippy::too_many_arguments)]
fn estimate_skew(
    tid: usize,
    histo: &[u32],
    block_size: u32,
    radix: &RadixConfig,
    skew: &SkewState,
    thresholds: &SkewThresholds,
    full_r_size: u32,
    full_s_size: u32,
    sbarrier: &SBarrier,
    step: &mut u8,
) -> Option<u32> {
    if full_s_size / full_r_size < thresholds.min_size_ratio {
        return None;
    }

    let mut max_a = 0u32;
    let mut max_b = 0u32;
    for &count in histo {
        if count > max_a {
            max_b = max_a;
            max_a = count;
        } else if count > max_b {
            max_b = count;
        }
    }

    let fanout_s = 1u32 << radix.s();
    let skew_threshold = (block_size as f64 * thresholds.ratio_threshold) as u32;
    let locally_skewed = if fanout_s > thresholds.small_fanout_cutoff {
        max_a + max_b > skew_threshold
    } else {
        max_a > block_size / 2 + thresholds.small_fanout_margin
    };

    if locally_skewed {
        skew.high_skew_observed.fetch_add(1, Ordering::AcqRel);
    }

    *step = sbarrier.wait(tid, *step);

    // Threads.N is not directly available here; the caller passes a
    // shared SkewState sized for exactly N participants, so reaching N
    // reports is equivalent to "all threads agreed".
    let all_agreed = skew.high_skew_observed.load(Ordering::Acquire) as usize == sbarrier_participants(sbarrier);

    if tid == 0 && all_agreed {
        tracing::info!(
            r_bits = radix.r(),
            "high skew observed in relation S, switching to Model III with f_R = 2^{}",
            radix.r() + 1
        );
        radix.switch_to_model_iii();
    }

    *step = sbarrier.wait(tid, *step);

    if all_agreed {
        Some(radix.s())
    } else {
        None
    }
}

fn sbarrier_participants(sbarrier: &SBarrier) -> usize {
    sbarrier.participants() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelationId;

    fn single_worker_sbarrier() -> SBarrier {
        SBarrier::new(1)
    }

    fn tuples_with_keys(keys: &[u32]) -> Vec<Tuple> {
        keys.iter()
            .map(|&k| Tuple { key: k, payload: k })
            .collect()
    }

    #[test]
    fn zero_radix_is_a_no_op() {
        let radix = RadixConfig::new(0, 0, true);
        let skew = SkewState::new();
        let thresholds = SkewThresholds::default();
        let sbarrier = single_worker_sbarrier();
        let mut step = 0u8;
        let mut tuples = tuples_with_keys(&[5, 3, 1, 4, 2]);

        let meta = icp(
            RelationId::R,
            &mut tuples,
            &radix,
            &skew,
            &thresholds,
            5,
            5,
            1,
            &sbarrier,
            0,
            &mut step,
        );
        assert_eq!(meta.num_blocks(), 0);
        assert_eq!(tuples, tuples_with_keys(&[5, 3, 1, 4, 2]));
    }

    #[test]
    fn partitions_are_contiguous_and_cover_all_tuples() {
        let radix = RadixConfig::new(2, 0, true);
        let skew = SkewState::new();
        let thresholds = SkewThresholds::default();
        let sbarrier = single_worker_sbarrier();
        let mut step = 0u8;

        let keys: Vec<u32> = (1u32..=1000).rev().collect();
        let mut tuples = tuples_with_keys(&keys);

        let meta = icp(
            RelationId::R,
            &mut tuples,
            &radix,
            &skew,
            &thresholds,
            1000,
            1000,
            1,
            &sbarrier,
            0,
            &mut step,
        );

        assert!(meta.num_blocks() >= 1);

        // Within each block's single sub-block (num_groups == 1), the
        // tuples must all hash to the declared partition and the ranges
        // must be contiguous and exactly cover the block.
        let mask = (1u32 << radix.r()) - 1;
        for block_pos in &meta.pos {
            assert_eq!(block_pos.len(), 4);
            for (partition, b) in block_pos.iter().enumerate() {
                for idx in b.start..b.end {
                    assert_eq!((tuples[idx as usize].key & mask) as usize, partition);
                }
            }
        }

        // Every original key must still be present exactly once.
        let mut seen: Vec<u32> = tuples.iter().map(|t| t.key).collect();
        seen.sort_unstable();
        let mut expected: Vec<u32> = keys;
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }
}
