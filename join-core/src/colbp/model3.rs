//! ColBP-III: `R_bits > 0`, `S_bits == 0`. Used when S is too skewed to
//! partition profitably (reached via ICP's skew detector, or a
//! user-pinned radix pair). R is still partitioned and built the same
//! group-swap way as Model II, but into one aggregate `|R|+1`-sized,
//! key-indexed table; S is probed whole, sequentially, with no
//! partitioning overhead.

use super::{HashTable, JoinStats, WorkerJoinContext};
use crate::types::{BlockMeta, SubRelation};
use std::sync::OnceLock;

#[allow(clippy::too_many_arguments)]
pub fn run(
    ctx: &WorkerJoinContext,
    step: &mut u8,
    sub_r: &SubRelation,
    sub_s: &SubRelation,
    blocks_r: &mut BlockMeta,
    model_iii_shift: u32,
    full_r_size: u32,
    r_bits: u32,
    tables: &OnceLock<Vec<HashTable>>,
) -> JoinStats {
    let num_groups = ctx.num_groups;
    assert_eq!(ctx.tid as u32 % num_groups, ctx.group as u32);

    let fanout_r = 1u32 << r_bits;
    let mask = fanout_r - 1;
    let htable_size = full_r_size as usize + 1;

    if ctx.tid == 0 {
        tables
            .set(vec![HashTable::new(htable_size)])
            .expect("Model III hash table initialized more than once");
    }

    ctx.barrier_a.wait(); // Wait until allocation is done.

    let global_table = &tables.get().expect("Model III hash table missing after barrier")[0];

    let iters = fanout_r / num_groups;
    let mut checksum = 0u64;

    for i in 0..iters {
        for g in 0..num_groups {
            let h = (g + ctx.group as u32) % num_groups;
            let p = h * iters + i;

            for block in blocks_r.pos.iter_mut() {
                let b = &mut block[h as usize];
                let mut idx = b.start;
                let end = b.end;
                while idx < end && p == ((sub_r.tuples[idx as usize].key >> model_iii_shift) & mask) {
                    let t = sub_r.tuples[idx as usize];
                    global_table.set(t.key as usize, t.payload);
                    checksum += t.key as u64;
                    idx += 1;
                }
                b.start = idx;
            }

            *step = ctx.sbarrier.wait(ctx.tid, *step);
        }
    }

    ctx.barrier_a.wait(); // Wait until all tables are constructed.

    let mut matches = 0u64;
    for t in &sub_s.tuples {
        checksum += global_table.get(t.key as usize) as u64;
        matches += 1;
    }

    ctx.barrier_a.wait(); // Wait until all probing is done, before cleanup.

    JoinStats { matches, checksum }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icp::{icp, SkewState};
    use crate::sync::{BarrierA, SBarrier};
    use crate::types::{RadixConfig, RelationId, SkewThresholds, Tuple};

    #[test]
    fn aggregate_table_join_matches_every_s_tuple() {
        let r_bits = 3u32;
        let radix = RadixConfig::new(r_bits, 0, true);
        let skew = SkewState::new();
        let thresholds = SkewThresholds::default();
        let sbarrier = SBarrier::new(1);
        let barrier_a = BarrierA::new(1);
        let mut step = 0u8;

        let r_size = 4000u32;
        let s_size = 9000u32;

        let mut r_tuples: Vec<Tuple> = (1..=r_size).map(|k| Tuple { key: k, payload: k }).collect();
        let s_tuples: Vec<Tuple> = (1..=r_size).cycle().take(s_size as usize).map(|k| Tuple { key: k, payload: 0 }).collect();

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

        let model_iii_shift = crate::icp::model_iii_shift(r_size, r_bits);

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

        let stats = run(&ctx, &mut step, &sub_r, &sub_s, &mut blocks_r, model_iii_shift, r_size, r_bits, &tables);
        assert_eq!(stats.matches, s_size as u64);
    }
}
