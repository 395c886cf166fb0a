//! ColBP-I: no partitioning. One shared, key-indexed hash table of size
//! `|R|+1`, built directly from R's primary-key property (bucket `k`
//! belongs to key `k`, with no hashing at all).

use super::{cooperative_share, HashTable, JoinStats, WorkerJoinContext};
use crate::types::SubRelation;
use std::sync::OnceLock;

/// Runs Model I for one worker. `tables` is a fresh, empty `OnceLock`
/// shared by every worker in this join; worker 0 populates it once, and
/// every worker (including worker 0) reads from it after the barrier
/// that follows.
pub fn run(
    ctx: &WorkerJoinContext,
    sub_r: &SubRelation,
    sub_s: &SubRelation,
    full_r_size: u32,
    tables: &OnceLock<Vec<HashTable>>,
) -> JoinStats {
    let htable_size = full_r_size as usize + 1;

    if ctx.tid == 0 {
        tables
            .set(vec![HashTable::new(htable_size)])
            .expect("Model I hash table initialized more than once");
    }

    ctx.barrier_a.wait(); // Wait for allocation.

    let table = &tables.get().expect("Model I hash table missing after barrier")[0];

    let (start, end) = cooperative_share(htable_size, ctx.num_threads, ctx.tid as u32);
    table.zero_range(start, end);

    ctx.barrier_a.wait(); // Wait for NUMA distribution.

    let mut checksum = 0u64;
    for t in &sub_r.tuples {
        table.set(t.key as usize, t.payload);
        checksum += t.key as u64;
    }

    ctx.barrier_a.wait(); // Wait for a completely constructed table.

    let mut matches = 0u64;
    for t in &sub_s.tuples {
        checksum += table.get(t.key as usize) as u64;
        matches += 1;
    }

    JoinStats { matches, checksum }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{BarrierA, SBarrier};
    use crate::types::{RelationId, Tuple};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_threaded_join_counts_every_s_tuple_as_a_match() {
        let r_tuples: Vec<Tuple> = (1..=100u32).map(|k| Tuple { key: k, payload: k * 7 }).collect();
        let s_tuples: Vec<Tuple> = (1..=100u32).map(|k| Tuple { key: k, payload: 0 }).collect();
        let sub_r = SubRelation { id: RelationId::R, offset: 0, tuples: r_tuples };
        let sub_s = SubRelation { id: RelationId::S, offset: 0, tuples: s_tuples };

        let barrier_a = BarrierA::new(1);
        let sbarrier = SBarrier::new(1);
        let ctx = WorkerJoinContext {
            tid: 0,
            group: 0,
            num_groups: 1,
            num_threads: 1,
            barrier_a: &barrier_a,
            sbarrier: &sbarrier,
        };
        let tables = OnceLock::new();

        let stats = run(&ctx, &sub_r, &sub_s, 100, &tables);
        assert_eq!(stats.matches, 100);
        let expected_checksum: u64 = (1..=100u64).map(|k| k).sum::<u64>() // R build sums keys
            + (1..=100u64).map(|k| k * 7).sum::<u64>(); // S probe sums payloads
        assert_eq!(stats.checksum, expected_checksum);
    }

    #[test]
    fn multi_threaded_matches_single_threaded_totals() {
        let n = 4u32;
        let r_size = 4000u32;
        let r_tuples: Vec<Tuple> = (1..=r_size).map(|k| Tuple { key: k, payload: k }).collect();
        let s_tuples: Vec<Tuple> = (1..=r_size).cycle().take(8000).map(|k| Tuple { key: k, payload: 0 }).collect();

        let barrier_a = Arc::new(BarrierA::new(n as usize));
        let sbarrier = Arc::new(SBarrier::new(n));
        let tables = Arc::new(OnceLock::new());

        let r_chunks: Vec<Vec<Tuple>> = chunk(&r_tuples, n);
        let s_chunks: Vec<Vec<Tuple>> = chunk(&s_tuples, n);

        let handles: Vec<_> = (0..n)
            .map(|tid| {
                let barrier_a = Arc::clone(&barrier_a);
                let sbarrier = Arc::clone(&sbarrier);
                let tables = Arc::clone(&tables);
                let sub_r = SubRelation { id: RelationId::R, offset: 0, tuples: r_chunks[tid as usize].clone() };
                let sub_s = SubRelation { id: RelationId::S, offset: 0, tuples: s_chunks[tid as usize].clone() };
                thread::spawn(move || {
                    let ctx = WorkerJoinContext {
                        tid: tid as usize,
                        group: 0,
                        num_groups: 1,
                        num_threads: n,
                        barrier_a: &barrier_a,
                        sbarrier: &sbarrier,
                    };
                    run(&ctx, &sub_r, &sub_s, r_size, &tables)
                })
            })
            .collect();

        let mut total_matches = 0u64;
        for h in handles {
            total_matches += h.join().unwrap().matches;
        }
        assert_eq!(total_matches, 8000);
    }

    fn chunk(tuples: &[Tuple], n: u32) -> Vec<Vec<Tuple>> {
        let share = tuples.len() / n as usize;
        (0..n)
            .map(|i| {
                let start = i as usize * share;
                let end = if i + 1 == n { tuples.len() } else { start + share };
                tuples[start..end].to_vec()
            })
            .collect()
    }
}
