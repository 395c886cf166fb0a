//! Ties together thread placement, barrier construction and pinned
//! worker spawning -- the glue between `topology`'s hardware discovery
//! and `join-core`'s barrier-disciplined Build/Probe models.
//!
//! Callers (`polyhj`) supply a single worker closure; [`run_workers`]
//! plans placement, builds one [`BarrierA`] and one [`SBarrier`] shared
//! by the whole pool, pins and spawns one OS thread per worker the way
//! `run_threads` does, and collects results back in `tid` order.

pub mod error;
pub mod relation;
pub mod splitting;
mod thread_plan;

pub use error::OrchestrateError;
pub use relation::{create_relation, SharedRelationBuffer};
pub use splitting::{split_relation, SubRange};
pub use thread_plan::{plan_threads, ThreadAssignment, ThreadPlan};

use join_core::{BarrierA, SBarrier};
use topology::Topology;

/// Everything a worker closure needs to participate in barrier-
/// disciplined partitioning and Build/Probe, handed to it by
/// [`run_workers`].
pub struct WorkerContext<'a> {
    pub tid: usize,
    pub group: usize,
    pub num_groups: u32,
    pub num_threads: u32,
    pub os_id: usize,
    pub barrier_a: &'a BarrierA,
    pub sbarrier: &'a SBarrier,
}

/// Plans thread placement, pins and spawns one OS thread per worker
/// (each running `worker_fn` with its own [`WorkerContext`]), and
/// collects results in `tid` order. Mirrors `run_threads`: every thread
/// is pinned to its assigned hardware context before doing any work.
pub fn run_workers<F, T>(
    topology: &Topology,
    num_threads: u32,
    favor_hyperthreading: bool,
    worker_fn: F,
) -> Result<Vec<T>, OrchestrateError>
where
    F: Fn(WorkerContext) -> T + Sync,
    T: Send,
{
    let plan = plan_threads(topology, num_threads, favor_hyperthreading)?;

    let barrier_a = BarrierA::new(num_threads as usize);
    let sbarrier = SBarrier::new(num_threads);

    let mut results: Vec<Option<T>> = (0..num_threads).map(|_| None).collect();

    std::thread::scope(|scope| -> Result<(), OrchestrateError> {
        let mut handles = Vec::with_capacity(num_threads as usize);

        for &assignment in &plan.assignments {
            let worker_fn = &worker_fn;
            let barrier_a = &barrier_a;
            let sbarrier = &sbarrier;
            let num_groups = plan.num_groups;

            handles.push(scope.spawn(move || -> Result<(usize, T), OrchestrateError> {
                let core_id = core_affinity::CoreId { id: assignment.os_id };
                if !core_affinity::set_for_current(core_id) {
                    return Err(OrchestrateError::PinningFailed {
                        tid: assignment.tid,
                        os_id: assignment.os_id,
                    });
                }

                let ctx = WorkerContext {
                    tid: assignment.tid as usize,
                    group: assignment.group as usize,
                    num_groups,
                    num_threads,
                    os_id: assignment.os_id,
                    barrier_a,
                    sbarrier,
                };
                Ok((assignment.tid as usize, worker_fn(ctx)))
            }));
        }

        for handle in handles {
            let (tid, value) = handle.join().expect("worker thread panicked")?;
            results[tid] = Some(value);
        }

        Ok(())
    })?;

    Ok(results
        .into_iter()
        .map(|r| r.expect("every planned worker reports exactly one result"))
        .collect())
}
