//! ColBP-II: symmetric radix partitioning (`R_bits == S_bits > 0`).
//! Workers are split into `num_groups` groups, one per utilized LLC; each
//! group owns one hash table at a time and the groups rotate ("swap")
//! across tables/partitions every iteration, so that every table is
//! always being built or probed by threads sharing its LLC.

use super::{cooperative_share, HashTable, JoinStats, WorkerJoinContext};
use crate::types::{BlockMeta, SubRelation};
use std::sync::OnceLock;

#[allow(clippy::too_many_arguments)]
pub fn run(
    ctx: &WorkerJoinContext,
    step: &mut u8,
    sub_r: &SubRelation,
    sub_s: &SubRelation,
    blocks_r: &mut BlockMeta,
    blocks_s: &mut BlockMeta,
    full_r_size: u32,
    r_bits: u32,
    tables: &OnceLock<Vec<HashTable>>,
) -> JoinStats {
    let num_groups = ctx.num_groups;
    assert_eq!(ctx.tid as u32 % num_groups, ctx.group as u32);

    let fanout_r = 1u32 << r_bits;
    let mask = fanout_r - 1;

    let avg_partition = (full_r_size >> r_bits) as u64 + 1;
    let htable_size = next_pow2(avg_partition) as usize;

    if ctx.tid == 0 {
        let mut v = Vec::with_capacity(num_groups as usize);
        v.resize_with(num_groups as usize, || HashTable::new(htable_size));
        tables
            .set(v)
            .expect("Model II hash tables initialized more than once");
    }

    ctx.barrier_a.wait(); // Wait for allocation.

    let table_list = tables.get().expect("Model II hash tables missing after barrier");

    // NUMA-distribute each table across twice-per-group worker counts
    // (matching the original's arbitrary "2 threads per group" share),
    // clamped to the actual worker count.
    let zeroers = (num_groups * 2).min(ctx.num_threads);
    for table in table_list {
        let (start, end) = cooperative_share(table.len(), zeroers, ctx.tid as u32);
        if (ctx.tid as u32) < zeroers {
            table.zero_range(start, end);
        }
    }

    ctx.barrier_a.wait(); // Wait for NUMA distribution.

    let iters = fanout_r / num_groups;
    let mut checksum = 0u64;
    let mut matches = 0u64;

    for i in 0..iters {
        // Build phase: each group scatters to a distinct table, then the
        // groups rotate which table they own.
        for g in 0..num_groups {
            let h = (g + ctx.group as u32) % num_groups;
            let p = h * iters + i;
            let table = &table_list[h as usize];

            for block in blocks_r.pos.iter_mut() {
                let b = &mut block[h as usize];
                let mut idx = b.start;
                let end = b.end;
                while idx < end && p == (sub_r.tuples[idx as usize].key & mask) {
                    let t = sub_r.tuples[idx as usize];
                    table.set((t.key >> r_bits) as usize, t.payload);
                    checksum += t.key as u64;
                    idx += 1;
                }
                b.start = idx;
            }

            *step = ctx.sbarrier.wait(ctx.tid, *step);
        }

        // Probe phase: same rotation, reverse order, no barrier needed
        // between table reads.
        for g in (0..num_groups).rev() {
            let h = (g + ctx.group as u32) % num_groups;
            let p = h * iters + i;
            let table = &table_list[h as usize];

            for block in blocks_s.pos.iter_mut() {
                let b = &mut block[h as usize];
                let mut idx = b.start;
                let end = b.end;
                while idx < end && p == (sub_s.tuples[idx as usize].key & mask) {
                    let t = sub_s.tuples[idx as usize];
                    checksum += table.get((t.key >> r_bits) as usize) as u64;
                    matches += 1;
                    idx += 1;
                }
                b.start = idx;
            }
        }

        *step = ctx.sbarrier.wait(ctx.tid, *step); // Don't rebuild until probing is done.
    }

    JoinStats { matches, checksum }
}

fn next_pow2(n: u64) -> u64 {
    if n <= 1 {
        return 1;
    }
    1u64 << (64 - (n - 1).leading_zeros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icp::{icp, SkewState};
    use crate::sync::{BarrierA, SBarrier};
    use crate::types::{RadixConfig, RelationId, SkewThresholds, Tuple};

    #[test]
    fn single_group_join_matches_every_s_tuple() {
        let r_bits = 2u32;
        let radix = RadixConfig::new(r_bits, r_bits, true);
        let skew = SkewState::new();
        let thresholds = SkewThresholds::default();
        let sbarrier = SBarrier::new(1);
        let barrier_a = BarrierA::new(1);
        let mut step = 0u8;

        let r_size = 4000u32;
        let s_size = 8000u32;
        let mut r_tuples: Vec<Tuple> = (1..=r_size).map(|k| Tuple { key: k, payload: k }).collect();
        let mut s_tuples: Vec<Tuple> = (1..=r_size).cycle().take(s_size as usize).map(|k| Tuple { key: k, payload: 0 }).collect();

        let mut blocks_r = icp(
            RelationId::R,
            &mut r_tuples,
            &radix,
            &skew,
            &thresholds,
            r_size,
            s_size,
            1,
            &sbarrier,
            0,
            &mut step,
        );
        let mut blocks_s = icp(
            RelationId::S,
            &mut s_tuples,
            &radix,
            &skew,
            &thresholds,
            r_size,
            s_size,
            1,
            &sbarrier,
            0,
            &mut step,
        );

        let sub_r = crate::types::SubRelation { id: RelationId::R, offset: 0, tuples: r_tuples };
        let sub_s = crate::types::SubRelation { id: RelationId::S, offset: 0, tuples: s_tuples };

        let ctx = WorkerJoinContext {
            tid: 0,
            group: 0,
            num_groups: 1,
            num_threads: 1,
            barrier_a: &barrier_a,
            sbarrier: &sbarrier,
        };
        let tables = std::sync::OnceLock::new();

        let stats = run(&ctx, &mut step, &sub_r, &sub_s, &mut blocks_r, &mut blocks_s, r_size, r_bits, &tables);
        assert_eq!(stats.matches, s_size as u64);
    }

    #[test]
    fn next_pow2_rounds_up() {
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(5), 8);
        assert_eq!(next_pow2(8), 8);
        assert_eq!(next_pow2(9), 16);
    }
}
