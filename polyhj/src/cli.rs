//! Command-line surface, parsed with `structopt`. Mirrors the original
//! program's `extract_cmd_args` option set (`--threads`, `--r`, `--s`,
//! `--skew`, `--radix`/`--radixR`/`--radixS`, `--favor_hyperthreading`),
//! plus the CPU-side knobs this port exposes that the GPU-era argument
//! parser never needed (skew-detector thresholds, page size, CSV export).

use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "polyhj",
    about = "Polymorphic NUMA-aware, cache-conscious equi-join benchmark"
)]
pub struct CmdOpt {
    /// Number of worker threads. Defaults to every hardware context the
    /// host topology exposes.
    #[structopt(long)]
    pub threads: Option<u32>,

    /// Number of tuples in relation R (the primary-key, "inner" side).
    #[structopt(long, default_value = "12800000")]
    pub r: u32,

    /// Number of tuples in relation S (the foreign-key, "outer" side).
    #[structopt(long, default_value = "12800000")]
    pub s: u32,

    /// Zipf skew exponent for S's foreign keys; 0.0 selects a uniform
    /// distribution.
    #[structopt(long, default_value = "0.0")]
    pub skew: f64,

    /// Sets both R_bits and S_bits to the same value and marks the
    /// radix configuration as user-defined.
    #[structopt(long)]
    pub radix: Option<u32>,

    /// Sets R_bits only (combine with --radix-s for an asymmetric,
    /// Model IV-eligible pair); also marks the configuration user-defined.
    #[structopt(long = "radix-r")]
    pub radix_r: Option<u32>,

    /// Sets S_bits only; also marks the configuration user-defined.
    #[structopt(long = "radix-s")]
    pub radix_s: Option<u32>,

    /// Prefer packing hyperthreads onto as few LLCs as possible, instead
    /// of spreading one thread per physical core across more LLCs.
    #[structopt(long)]
    pub favor_hyperthreading: bool,

    /// Minimum |S| / |R| ratio before the skew detector considers
    /// switching to Model III.
    #[structopt(long = "skew-min-ratio", default_value = "3")]
    pub skew_min_ratio: u32,

    /// Combined top-two-partitions share above which skew is reported,
    /// for fanouts above `skew-small-fanout-cutoff`.
    #[structopt(long = "skew-ratio-threshold", default_value = "0.35")]
    pub skew_ratio_threshold: f64,

    /// Extra tuple-count margin added to `block_size / 2` under the
    /// small-fanout skew rule.
    #[structopt(long = "skew-small-fanout-margin", default_value = "10")]
    pub skew_small_fanout_margin: u32,

    /// Override the auto-detected (or 2 MiB fallback) VM page size.
    #[structopt(long = "page-size-bytes")]
    pub page_size_bytes: Option<usize>,

    /// Number of times to repeat the join, for measurement averaging.
    #[structopt(long, default_value = "1")]
    pub repeat: u32,

    /// Append one CSV row per repetition to this path.
    #[structopt(long, parse(from_os_str))]
    pub csv: Option<PathBuf>,
}
