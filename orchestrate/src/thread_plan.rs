//! Assigns each worker a hardware context and an LLC-group id, the way
//! `prepare_threads_meta` does in the original program: pack onto
//! physical cores first (spreading across as few LLCs as possible)
//! unless `favor_hyperthreading` is set, in which case hyperthreads on a
//! packed set of LLCs are preferred over spreading across more of them.

use crate::error::OrchestrateError;
use topology::Topology;

#[derive(Debug, Clone, Copy)]
pub struct ThreadAssignment {
    pub tid: u32,
    pub group: u32,
    pub os_id: usize,
}

#[derive(Debug)]
pub struct ThreadPlan {
    pub num_threads: u32,
    pub num_groups: u32,
    pub assignments: Vec<ThreadAssignment>,
}

/// Builds the thread-to-context assignment for `num_threads` workers.
///
/// Mirrors the original's two knobs: `favor_hyperthreading = false`
/// (the original's default, `favor_physical_cores = true`) prefers one
/// thread per physical core, spread across as few LLCs as the thread
/// count allows; `favor_hyperthreading = true` packs hyperthreads onto
/// fewer LLCs instead.
pub fn plan_threads(
    topology: &Topology,
    num_threads: u32,
    favor_hyperthreading: bool,
) -> Result<ThreadPlan, OrchestrateError> {
    let available = topology.total_hw_contexts();
    if num_threads as usize > available {
        return Err(OrchestrateError::NotEnoughHardwareContexts {
            requested: num_threads,
            available,
        });
    }

    let contexts = if favor_hyperthreading {
        topology.contexts_packed_per_llc()
    } else {
        topology.contexts_spread_across_llcs()
    };

    // Determine how many contexts sit on each LLC, in the same order
    // `contexts` enumerates them, so we can recover each chosen context's
    // group id.
    let llc_sizes: Vec<usize> = topology
        .llcs()
        .iter()
        .map(|l| l.cores.iter().map(|c| c.contexts.len()).sum())
        .collect();

    let assignments = if favor_hyperthreading {
        assign_packed(&contexts, &llc_sizes, num_threads)
    } else {
        assign_spread(topology, num_threads)
    };

    let num_groups = assignments
        .iter()
        .map(|a| a.group)
        .max()
        .map(|m| m + 1)
        .unwrap_or(1);

    Ok(ThreadPlan {
        num_threads,
        num_groups,
        assignments,
    })
}

fn assign_packed(
    contexts: &[topology::HwContext],
    llc_sizes: &[usize],
    num_threads: u32,
) -> Vec<ThreadAssignment> {
    let mut out = Vec::with_capacity(num_threads as usize);
    let mut remaining = num_threads as usize;
    let mut ctx_iter = contexts.iter();
    let mut tid = 0u32;

    for (group, &size) in llc_sizes.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        let take = size.min(remaining);
        for _ in 0..take {
            let ctx = ctx_iter.next().expect("context count matches llc_sizes sum");
            out.push(ThreadAssignment {
                tid,
                group: group as u32,
                os_id: ctx.os_id,
            });
            tid += 1;
        }
        remaining -= take;
    }

    out
}

/// Round-robins threads across LLCs one at a time (group = `tid %
/// utilized_llcs` in the original's construction), picking the least-
/// loaded core on each LLC before moving to the next hardware context on
/// that same core -- exactly `prepare_threads_meta`'s loop.
fn assign_spread(topology: &Topology, num_threads: u32) -> Vec<ThreadAssignment> {
    let llcs = topology.llcs();
    let cores_per_llc = llcs
        .iter()
        .map(|l| l.cores.len())
        .min()
        .unwrap_or(1)
        .max(1);
    let actual_cpus_per_core = llcs
        .iter()
        .flat_map(|l| l.cores.iter())
        .map(|c| c.contexts.len())
        .min()
        .unwrap_or(1)
        .max(1);

    // Mirrors `prepare_threads_meta`'s `favor_physical_cores && num_cores
    // >= N` rule: when there are enough physical cores to give every
    // thread its own, use exactly one context per core regardless of the
    // host's actual SMT width.
    let num_cores: usize = llcs.iter().map(|l| l.cores.len()).sum();
    let cpus_per_core = if num_cores >= num_threads as usize {
        1
    } else {
        actual_cpus_per_core
    };
    let cpus_per_llc = cpus_per_core * cores_per_llc;

    let utilized_llcs = div_ceil(num_threads as usize, cpus_per_llc).max(1);
    let utilizable_cores = utilized_llcs * cores_per_llc;
    let utilized_cpus_per_core = div_ceil(num_threads as usize, utilizable_cores).max(1);

    let mut cores_on_llc = vec![0usize; utilized_llcs];
    let mut cpus_on_core: Vec<Vec<usize>> = llcs
        .iter()
        .take(utilized_llcs)
        .map(|l| vec![0usize; l.cores.len()])
        .collect();

    let mut out = Vec::with_capacity(num_threads as usize);
    let mut llc = 0usize;

    for tid in 0..num_threads {
        let core_idx = cores_on_llc[llc];
        let core = &llcs[llc].cores[core_idx];
        let cpu_idx = cpus_on_core[llc][core_idx];
        let os_id = core.contexts[cpu_idx].os_id;

        out.push(ThreadAssignment {
            tid,
            group: llc as u32,
            os_id,
        });

        cpus_on_core[llc][core_idx] += 1;
        if cpus_on_core[llc][core_idx] == utilized_cpus_per_core {
            cores_on_llc[llc] += 1;
        }

        llc = (llc + 1) % utilized_llcs;
    }

    out
}

fn div_ceil(a: usize, b: usize) -> usize {
    (a / b) + usize::from(a % b > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology::{Core, HwContext, Llc};

    #[test]
    fn spread_assignment_uses_round_robin_groups() {
        // Build a synthetic topology with 2 LLCs x 2 cores x 1 context.
        let topo = topology_fixture(2, 2, 1);
        let plan = plan_threads(&topo, 4, false).unwrap();
        assert_eq!(plan.num_groups, 2);
        let groups: Vec<u32> = plan.assignments.iter().map(|a| a.group).collect();
        assert_eq!(groups, vec![0, 1, 0, 1]);
    }

    #[test]
    fn rejects_too_many_threads() {
        let topo = topology_fixture(1, 1, 1);
        assert!(plan_threads(&topo, 5, false).is_err());
    }

    fn topology_fixture(num_llcs: usize, cores_per_llc: usize, cpus_per_core: usize) -> Topology {
        let llcs: Vec<Llc> = (0..num_llcs)
            .map(|_| Llc {
                size_bytes: 8 * 1024 * 1024,
                cores: (0..cores_per_llc)
                    .map(|_| Core {
                        contexts: (0..cpus_per_core).map(|i| HwContext { os_id: i }).collect(),
                    })
                    .collect(),
            })
            .collect();
        topology::testing::from_parts(llcs, 64, 2 * 1024 * 1024)
    }
}
