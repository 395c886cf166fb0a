//! The two collective rendezvous primitives every ColBP model is built on.
//!
//! `Barrier-A` is a plain, infrequent phase-transition rendezvous: it maps
//! directly onto [`std::sync::Barrier`], so this module just re-exports
//! it under the name the rest of this crate's documentation uses.
//!
//! [`SBarrier`] is the hot-path primitive: a rotating ring of atomic
//! counters (`MAGICNUM` deep) that lets cooperating threads hand off
//! partitions between LLC groups without the per-call setup cost of a
//! full barrier. It is only safe to use across threads that call `wait`
//! the same number of times in the same order -- which is exactly how
//! ColBP II/III/IV invoke it, once per group-swap step inside an
//! iteration that every thread executes identically.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{fence, AtomicU32, Ordering};

pub use std::sync::Barrier as BarrierA;

/// Depth of the sbarrier ring. Must be greater than 3 so that a slow
/// thread can never be more than one full ring rotation behind a fast
/// one without the fast one blocking first; matches the original
/// program's constant of the same name.
pub const MAGICNUM: usize = 8;

/// A rotating-step barrier for N cooperating threads. Cheaper than a
/// full [`BarrierA`] round-trip because each `wait` only spins on one
/// ring slot and never blocks on condvar machinery.
#[derive(Debug)]
pub struct SBarrier {
    ring: [CachePadded<AtomicU32>; MAGICNUM],
    n: u32,
}

impl SBarrier {
    pub fn new(n: u32) -> SBarrier {
        assert!(n > 0, "sbarrier requires at least one participant");
        SBarrier {
            ring: Default::default(),
            n,
        }
    }

    pub fn participants(&self) -> u32 {
        self.n
    }

    /// Block until all `n` participants have called `wait` for this
    /// step. `step` is the caller's own rotating position in the ring
    /// (`0..MAGICNUM`); callers own their step counter and advance it via
    /// the value this call returns.
    pub fn wait(&self, tid: usize, step: u8) -> u8 {
        let slot = step as usize % MAGICNUM;
        let counter = &self.ring[slot];

        let mut w = counter.fetch_add(1, Ordering::AcqRel) + 1;
        while w != self.n {
            w = counter.load(Ordering::Acquire);
        }

        fence(Ordering::SeqCst);

        if tid == 0 {
            let prev = if slot == 0 { MAGICNUM - 1 } else { slot - 1 };
            self.ring[prev].store(0, Ordering::Release);
        }

        ((slot + 1) % MAGICNUM) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn sbarrier_rendezvous_with_n_threads() {
        let n = 6u32;
        let rounds = 50u32;
        let barrier = Arc::new(SBarrier::new(n));
        let round_counter = Arc::new(AtomicU32::new(0));
        let max_observed = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..n)
            .map(|tid| {
                let barrier = Arc::clone(&barrier);
                let round_counter = Arc::clone(&round_counter);
                let max_observed = Arc::clone(&max_observed);
                thread::spawn(move || {
                    let mut step = 0u8;
                    for _ in 0..rounds {
                        let arrived = round_counter.fetch_add(1, Ordering::SeqCst) + 1;
                        max_observed.fetch_max(arrived, Ordering::SeqCst);
                        step = barrier.wait(tid as usize, step);
                        // Everyone has arrived by the time wait() returns
                        // for the last arriver, so no thread can start a
                        // fresh round while another is still behind.
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(round_counter.load(Ordering::SeqCst), n * rounds);
        assert!(max_observed.load(Ordering::SeqCst) <= n * rounds);
    }

    #[test]
    fn barrier_a_is_std_barrier() {
        let barrier = Arc::new(BarrierA::new(2));
        let b2 = Arc::clone(&barrier);
        let h = thread::spawn(move || {
            b2.wait();
        });
        barrier.wait();
        h.join().unwrap();
    }
}
