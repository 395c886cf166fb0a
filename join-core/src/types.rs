//! Relation, tuple and block-position types shared by ICP and every ColBP
//! model.

use std::sync::atomic::{AtomicU32, Ordering};

/// A join key. Relation R holds a permutation of `[1, |R|]`; relation S
/// holds keys drawn from the same range, so every probe is guaranteed to
/// match.
pub type Key = u32;
/// A tuple payload. Carried through build/probe purely so that a probe's
/// checksum reflects real memory traffic, the same way an unmaterialized
/// hash-join benchmark would.
pub type Payload = u32;
/// The value stored in a hash table bucket (always a matched tuple's
/// payload).
pub type Bucket = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuple {
    pub key: Key,
    pub payload: Payload,
}

/// Which relation a [`SubRelation`] belongs to. ICP and the ColBP models
/// branch on this (e.g. only R is shifted under the Model III hash, only
/// S's first block is skew-sampled).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationId {
    R,
    S,
}

/// One worker's contiguous, privately-owned slice of a relation, after
/// NUMA localization.
#[derive(Debug)]
pub struct SubRelation {
    pub id: RelationId,
    pub offset: u32,
    pub tuples: Vec<Tuple>,
}

impl SubRelation {
    pub fn size(&self) -> u32 {
        self.tuples.len() as u32
    }
}

/// A contiguous run of tuple indices belonging to one partition (or, for
/// block 0, the arithmetic carried over from ICP's in-place scatter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Block {
    pub start: u32,
    pub end: u32,
}

/// Per-block, per-sub-block position table produced by ICP and consumed
/// (and mutated in place, as each ColBP iteration advances `start`) by the
/// Build/Probe models. `pos[block][sub_block]`.
#[derive(Debug, Default)]
pub struct BlockMeta {
    pub pos: Vec<Vec<Block>>,
}

impl BlockMeta {
    pub fn num_blocks(&self) -> usize {
        self.pos.len()
    }
}

/// The process-wide radix configuration: how many low-order key bits
/// partition R and S respectively. Mutated at most once, by worker 0,
/// when ICP's embedded skew detector switches the whole join to Model
/// III; every other worker observes the switch through a barrier rather
/// than a lock, so plain atomics with relaxed ordering suffice.
#[derive(Debug)]
pub struct RadixConfig {
    r: AtomicU32,
    s: AtomicU32,
    user_defined: bool,
}

impl RadixConfig {
    pub fn new(r: u32, s: u32, user_defined: bool) -> RadixConfig {
        RadixConfig {
            r: AtomicU32::new(r),
            s: AtomicU32::new(s),
            user_defined,
        }
    }

    pub fn r(&self) -> u32 {
        self.r.load(Ordering::Relaxed)
    }

    pub fn s(&self) -> u32 {
        self.s.load(Ordering::Relaxed)
    }

    pub fn user_defined(&self) -> bool {
        self.user_defined
    }

    /// Called by worker 0 only, from inside the skew detector's own
    /// barrier-guarded critical section: double R's fanout and fall back
    /// to an unpartitioned S (Model III).
    pub(crate) fn switch_to_model_iii(&self) {
        self.s.store(0, Ordering::Relaxed);
        self.r.fetch_add(1, Ordering::Relaxed);
    }
}

/// Thresholds controlling ICP's embedded skew detector. Defaults match
/// the original program's empirically chosen constants; all are exposed
/// for override since the original documents them as arbitrary.
#[derive(Debug, Clone, Copy)]
pub struct SkewThresholds {
    /// Minimum |S|/|R| ratio before skew switching is even considered.
    pub min_size_ratio: u32,
    /// Combined share of the top two partitions (of a block) above which
    /// skew is reported, when fanout > `small_fanout_cutoff`.
    pub ratio_threshold: f64,
    /// Fanout at or below which the single-largest-partition rule (plus
    /// `small_fanout_margin`) is used instead of the combined-top-two rule.
    pub small_fanout_cutoff: u32,
    /// Extra tuple-count margin added to `block_size / 2` under the
    /// small-fanout rule.
    pub small_fanout_margin: u32,
}

impl Default for SkewThresholds {
    fn default() -> SkewThresholds {
        SkewThresholds {
            min_size_ratio: 3,
            ratio_threshold: 0.35,
            small_fanout_cutoff: 4,
            small_fanout_margin: 10,
        }
    }
}
