//! One CSV row per repetition, in the teacher's `DataPoint` shape:
//! a flat, `Serialize`-derived struct built once as a template from the
//! resolved configuration, then cloned and filled in with each run's
//! timings and result.

use crate::cli::CmdOpt;
use serde_derive::Serialize;

#[derive(Clone, Debug, Default, Serialize)]
pub struct DataPoint {
    pub threads: u32,
    pub r_tuples: u32,
    pub s_tuples: u32,
    pub skew: f64,
    pub r_bits: u32,
    pub s_bits: u32,
    pub user_defined_radix: bool,
    pub favor_hyperthreading: bool,
    pub num_llcs: usize,
    pub llc_size_bytes: usize,
    pub generation_ns: Option<u128>,
    pub partition_ns: Option<u128>,
    pub build_probe_ns: Option<u128>,
    pub total_ns: Option<u128>,
    pub matches: Option<u64>,
    pub checksum: Option<u64>,
}

impl DataPoint {
    #[allow(clippy::too_many_arguments)]
    pub fn template(
        cmd: &CmdOpt,
        num_threads: u32,
        num_llcs: usize,
        llc_size_bytes: usize,
        r_bits: u32,
        s_bits: u32,
        user_defined_radix: bool,
    ) -> DataPoint {
        DataPoint {
            threads: num_threads,
            r_tuples: cmd.r,
            s_tuples: cmd.s,
            skew: cmd.skew,
            r_bits,
            s_bits,
            user_defined_radix,
            favor_hyperthreading: cmd.favor_hyperthreading,
            num_llcs,
            llc_size_bytes,
            ..DataPoint::default()
        }
    }
}
