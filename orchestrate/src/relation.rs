//! Allocates, fills and NUMA-localizes one relation's tuple buffer, the
//! way `create_rel` does in the original program: allocate a shared
//! buffer, have every worker first-touch-zero its own sub-range, let one
//! worker fill the whole buffer with the generated keys, then have every
//! worker copy its own sub-range into a privately owned `Vec` before the
//! shared buffer is torn down.
//!
//! Unlike the original, the shared buffer is dropped as a whole once
//! every worker has copied out its share, rather than progressively
//! `realloc`'d down thread by thread -- that trick only existed to keep
//! peak memory low on a single shared allocation and has no bearing on
//! the join's result.

use crate::splitting::SubRange;
use join_core::{BarrierA, RelationId, Tuple};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::OnceLock;

pub struct SharedRelationBuffer {
    ptr: *mut Tuple,
    len: usize,
}

unsafe impl Send for SharedRelationBuffer {}
unsafe impl Sync for SharedRelationBuffer {}

impl SharedRelationBuffer {
    pub fn new(len: usize) -> SharedRelationBuffer {
        let layout = Layout::array::<Tuple>(len.max(1)).expect("relation size overflow");
        // SAFETY: layout is non-zero-sized (len.max(1)) and alloc_zeroed's
        // contract only requires a valid Layout, which Layout::array
        // guarantees here.
        let ptr = unsafe { alloc_zeroed(layout) as *mut Tuple };
        assert!(!ptr.is_null(), "relation buffer allocation failed");
        SharedRelationBuffer { ptr, len }
    }

    /// First-touches `[start, end)` by re-zeroing it, for NUMA placement;
    /// a no-op for correctness since the allocation is already zeroed.
    pub fn zero_range(&self, start: usize, end: usize) {
        assert!(end <= self.len);
        // SAFETY: start..end is within bounds, and disjoint from any
        // other worker's concurrently zeroed range by construction
        // (callers partition [0, len) by worker sub-range).
        unsafe {
            std::ptr::write_bytes(self.ptr.add(start), 0u8, end - start);
        }
    }

    /// Overwrites the whole buffer. Called by exactly one worker, after
    /// every worker's first-touch pass and before any worker reads.
    pub fn fill(&self, tuples: &[Tuple]) {
        assert_eq!(tuples.len(), self.len);
        // SAFETY: tuples.len() == self.len (asserted), and the caller
        // guarantees this runs after first-touch and before any reader.
        unsafe {
            std::ptr::copy_nonoverlapping(tuples.as_ptr(), self.ptr, self.len);
        }
    }

    /// Copies `[start, end)` out into a privately owned `Vec`, the
    /// NUMA-local slice a worker keeps for the rest of the run.
    pub fn copy_out(&self, start: usize, end: usize) -> Vec<Tuple> {
        assert!(end <= self.len);
        let mut out = Vec::with_capacity(end - start);
        // SAFETY: start..end within bounds, out has capacity end-start,
        // and set_len follows a full init by copy_nonoverlapping.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.add(start), out.as_mut_ptr(), end - start);
            out.set_len(end - start);
        }
        out
    }
}

impl Drop for SharedRelationBuffer {
    fn drop(&mut self) {
        let layout = Layout::array::<Tuple>(self.len.max(1)).expect("relation size overflow");
        // SAFETY: ptr was allocated by `Self::new` with this same layout.
        unsafe { dealloc(self.ptr as *mut u8, layout) };
    }
}

/// Allocates (on worker 0 only), NUMA-distributes, fills and localizes
/// one relation, returning the calling worker's own privately owned
/// sub-range.
///
/// `full_size`/`sub_range` describe the relation being built; `r_size`
/// is relation R's size, needed even when building S since S's foreign
/// keys are drawn from R's key space.
#[allow(clippy::too_many_arguments)]
pub fn create_relation(
    id: RelationId,
    full_size: u32,
    sub_range: SubRange,
    tid: usize,
    seed: u64,
    skew: f64,
    r_size: u32,
    shared: &OnceLock<SharedRelationBuffer>,
    barrier: &BarrierA,
) -> Vec<Tuple> {
    if tid == 0 {
        let _ = shared.set(SharedRelationBuffer::new(full_size as usize));
    }
    barrier.wait();

    let buffer = shared.get().expect("relation buffer initialized by worker 0");

    let start = sub_range.offset as usize;
    let end = start + sub_range.size as usize;

    buffer.zero_range(start, end);
    barrier.wait();

    if tid == 0 {
        let tuples = match id {
            RelationId::R => datagen::generate_primary_keys(full_size, seed),
            RelationId::S => datagen::generate_foreign_keys(r_size, full_size, skew, seed)
                .expect("relation sizes are validated before generation is dispatched"),
        };
        buffer.fill(&tuples);
    }
    barrier.wait();

    let local = buffer.copy_out(start, end);
    barrier.wait();

    local
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn single_threaded_primary_relation_round_trips() {
        let shared: OnceLock<SharedRelationBuffer> = OnceLock::new();
        let barrier = Barrier::new(1);
        let local = create_relation(
            RelationId::R,
            100,
            SubRange { offset: 0, size: 100 },
            0,
            42,
            0.0,
            100,
            &shared,
            &barrier,
        );
        assert_eq!(local.len(), 100);
        let mut keys: Vec<u32> = local.iter().map(|t| t.key).collect();
        keys.sort_unstable();
        assert_eq!(keys, (1..=100).collect::<Vec<u32>>());
    }

    #[test]
    fn multi_threaded_localization_partitions_without_overlap_or_loss() {
        let full_size = 97u32;
        let num_threads = 4u32;
        let ranges = crate::splitting::split_relation(full_size, num_threads);

        let shared: OnceLock<SharedRelationBuffer> = OnceLock::new();
        let barrier = Barrier::new(num_threads as usize);

        thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .iter()
                .enumerate()
                .map(|(tid, &range)| {
                    let shared = &shared;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        create_relation(RelationId::R, full_size, range, tid, 7, 0.0, full_size, shared, barrier)
                    })
                })
                .collect();

            let mut all_keys = Vec::new();
            for (tid, h) in handles.into_iter().enumerate() {
                let local = h.join().unwrap();
                assert_eq!(local.len(), ranges[tid].size as usize);
                all_keys.extend(local.into_iter().map(|t| t.key));
            }

            all_keys.sort_unstable();
            assert_eq!(all_keys, (1..=full_size).collect::<Vec<u32>>());
        });
    }
}
