//! Host topology discovery for NUMA-aware, cache-conscious thread placement.
//!
//! Enumerates the last-level-cache (LLC) -> physical core -> hardware
//! context hierarchy by reading `/sys/devices/system/cpu`, and exposes the
//! cache/page-size facts the join core and orchestrator need to size
//! blocks, hash tables and pinned thread pools. When the hierarchy cannot
//! be determined (unusual kernel, containerized `/sys`, non-Linux host)
//! conservative fallback constants are used instead of failing, matching
//! the original program's documented unreliability of this kind of
//! discovery.

mod error;
mod sysfs;

pub use error::TopologyError;

use std::path::Path;

/// Conservative fallback when `/sys` does not expose a usable LLC size.
pub const FALLBACK_LLC_SIZE_BYTES: usize = 8 * 1024 * 1024;
/// Conservative fallback cache line size.
pub const FALLBACK_LINE_SIZE_BYTES: usize = 64;
/// Conservative fallback VM page size (2 MiB huge page).
pub const FALLBACK_PAGE_SIZE_BYTES: usize = 2 * 1024 * 1024;

/// One hardware (logical) context, e.g. a single SMT thread of a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwContext {
    pub os_id: usize,
}

/// One physical core, grouping the hardware contexts that share it (SMT
/// siblings).
#[derive(Debug, Clone)]
pub struct Core {
    pub contexts: Vec<HwContext>,
}

/// One last-level cache, grouping the physical cores that share it.
#[derive(Debug, Clone)]
pub struct Llc {
    pub cores: Vec<Core>,
    pub size_bytes: usize,
}

/// The discovered (or synthesized) topology of the host.
#[derive(Debug, Clone)]
pub struct Topology {
    llcs: Vec<Llc>,
    line_size_bytes: usize,
    page_size_bytes: usize,
}

impl Topology {
    /// Discover the topology of the current host, falling back to
    /// conservative defaults for any fact that cannot be read.
    pub fn discover() -> Result<Topology, TopologyError> {
        Topology::discover_from(Path::new("/sys/devices/system/cpu"))
    }

    /// Discover from an arbitrary sysfs-shaped root; used directly by
    /// tests to exercise the parser against fixture trees.
    pub fn discover_from(cpu_root: &Path) -> Result<Topology, TopologyError> {
        let llcs = sysfs::discover_llcs(cpu_root).unwrap_or_else(|err| {
            tracing::warn!(
                error = %err,
                "LLC topology discovery failed, falling back to single-LLC view"
            );
            sysfs::fallback_llcs(cpu_root)
        });

        if llcs.is_empty() {
            return Err(TopologyError::NoHardwareContexts);
        }

        let line_size_bytes = sysfs::discover_line_size(cpu_root).unwrap_or_else(|err| {
            tracing::warn!(error = %err, fallback = FALLBACK_LINE_SIZE_BYTES, "cache line size discovery failed");
            FALLBACK_LINE_SIZE_BYTES
        });
        let page_size_bytes = sysfs::discover_page_size().unwrap_or_else(|err| {
            tracing::warn!(error = %err, fallback = FALLBACK_PAGE_SIZE_BYTES, "page size discovery failed");
            FALLBACK_PAGE_SIZE_BYTES
        });

        tracing::info!(
            llcs = llcs.len(),
            contexts = llcs.iter().map(|l| l.cores.iter().map(|c| c.contexts.len()).sum::<usize>()).sum::<usize>(),
            line_size_bytes,
            page_size_bytes,
            "discovered host topology"
        );

        Ok(Topology {
            llcs,
            line_size_bytes,
            page_size_bytes,
        })
    }

    /// Override the page size, e.g. from a user-supplied CLI flag.
    pub fn with_page_size_bytes(mut self, page_size_bytes: usize) -> Topology {
        self.page_size_bytes = page_size_bytes;
        self
    }

    pub fn llcs(&self) -> &[Llc] {
        &self.llcs
    }

    pub fn num_llcs(&self) -> usize {
        self.llcs.len()
    }

    /// Smallest LLC capacity across the host; ICP sizes its blocks so that
    /// a handful fit comfortably inside the smallest shared cache.
    pub fn min_llc_size_bytes(&self) -> usize {
        self.llcs
            .iter()
            .map(|l| l.size_bytes)
            .min()
            .unwrap_or(FALLBACK_LLC_SIZE_BYTES)
    }

    pub fn line_size_bytes(&self) -> usize {
        self.line_size_bytes
    }

    pub fn page_size_bytes(&self) -> usize {
        self.page_size_bytes
    }

    /// All hardware contexts in the host, grouped by LLC then by core, in
    /// the order that favors spreading threads across LLCs first (best
    /// for minimizing cross-LLC partition-swap traffic in ColBP-II/IV).
    pub fn contexts_spread_across_llcs(&self) -> Vec<HwContext> {
        let mut by_llc: Vec<std::slice::Iter<Core>> =
            self.llcs.iter().map(|l| l.cores.iter()).collect();
        let mut out = Vec::new();
        loop {
            let mut any = false;
            for cores in by_llc.iter_mut() {
                if let Some(core) = cores.next() {
                    any = true;
                    out.extend(core.contexts.iter().copied());
                }
            }
            if !any {
                break;
            }
        }
        out
    }

    /// All hardware contexts, packing each LLC fully (including SMT
    /// siblings) before moving to the next -- preferred when the caller
    /// passed `--favor-hyperthreading`.
    pub fn contexts_packed_per_llc(&self) -> Vec<HwContext> {
        self.llcs
            .iter()
            .flat_map(|l| l.cores.iter())
            .flat_map(|c| c.contexts.iter().copied())
            .collect()
    }

    pub fn total_hw_contexts(&self) -> usize {
        self.llcs
            .iter()
            .flat_map(|l| l.cores.iter())
            .map(|c| c.contexts.len())
            .sum()
    }
}

/// Test-fixture support for downstream crates that need a synthetic
/// topology without touching `/sys`. Not behind `#[cfg(test)]` since
/// other workspace crates' own test suites (e.g. `orchestrate`'s thread
/// placement tests) need it across the crate boundary.
pub mod testing {
    use super::{Llc, Topology};

    pub fn from_parts(llcs: Vec<Llc>, line_size_bytes: usize, page_size_bytes: usize) -> Topology {
        Topology {
            llcs,
            line_size_bytes,
            page_size_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_topology_has_at_least_one_context() {
        let llcs = sysfs::fallback_llcs(Path::new("/nonexistent"));
        assert!(!llcs.is_empty());
        assert!(llcs[0].cores[0].contexts.len() >= 1);
    }

    #[test]
    fn spread_and_packed_contain_same_contexts() {
        let topo = Topology {
            llcs: vec![
                Llc {
                    size_bytes: FALLBACK_LLC_SIZE_BYTES,
                    cores: vec![
                        Core { contexts: vec![HwContext { os_id: 0 }] },
                        Core { contexts: vec![HwContext { os_id: 1 }] },
                    ],
                },
                Llc {
                    size_bytes: FALLBACK_LLC_SIZE_BYTES,
                    cores: vec![Core { contexts: vec![HwContext { os_id: 2 }] }],
                },
            ],
            line_size_bytes: FALLBACK_LINE_SIZE_BYTES,
            page_size_bytes: FALLBACK_PAGE_SIZE_BYTES,
        };

        let mut spread: Vec<usize> = topo.contexts_spread_across_llcs().iter().map(|c| c.os_id).collect();
        let mut packed: Vec<usize> = topo.contexts_packed_per_llc().iter().map(|c| c.os_id).collect();
        spread.sort_unstable();
        packed.sort_unstable();
        assert_eq!(spread, packed);
        assert_eq!(spread, vec![0, 1, 2]);
    }

    #[test]
    fn with_page_size_bytes_overrides() {
        let topo = Topology {
            llcs: vec![Llc {
                size_bytes: FALLBACK_LLC_SIZE_BYTES,
                cores: vec![Core { contexts: vec![HwContext { os_id: 0 }] }],
            }],
            line_size_bytes: FALLBACK_LINE_SIZE_BYTES,
            page_size_bytes: FALLBACK_PAGE_SIZE_BYTES,
        }
        .with_page_size_bytes(4096);
        assert_eq!(topo.page_size_bytes(), 4096);
    }
}
