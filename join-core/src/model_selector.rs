//! Chooses a fanout before ICP runs, and a Build/Probe model afterward.

use crate::error::JoinError;
use crate::types::Bucket;

/// Which Collaborative Build/Probe model a (R_bits, S_bits) pair selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// No partitioning: one shared, key-indexed table.
    I,
    /// Symmetric radix partitioning with group-swap across LLCs.
    II,
    /// R partitioned, S left whole (reached via the skew detector, or by
    /// a user who pins R_bits > 0 and S_bits == 0 directly).
    III,
    /// R partitioned finer than S (only reachable with a user-pinned,
    /// asymmetric radix pair).
    IV,
}

/// Picks the model implied by a radix pair observed *after* ICP has run
/// (and the skew detector has had its chance to mutate it).
pub fn select_model(r_bits: u32, s_bits: u32) -> Result<Model, JoinError> {
    match (r_bits, s_bits) {
        (0, 0) => Ok(Model::I),
        (r, s) if r == s && r > 0 => Ok(Model::II),
        (r, 0) if r > 0 => Ok(Model::III),
        (r, s) if r > s && s > 0 => Ok(Model::IV),
        (r, s) => Err(JoinError::UnreachableRadixCombination { r, s }),
    }
}

/// Heuristic initial fanout, applied before ICP and before the skew
/// detector gets a chance to run: if R is large relative to the LLC,
/// partition both R and S symmetrically (Model II); otherwise leave both
/// radices at zero (Model I). A user-supplied radix always wins.
pub fn initial_fanout(r_size: u32, llc_size_bytes: usize, user_defined: bool) -> (u32, u32) {
    if user_defined {
        // Caller already has the user's values; this path exists so
        // `initial_fanout` is total and callers don't need a separate
        // branch at the call site.
        return (0, 0);
    }

    let bucket_bytes = std::mem::size_of::<Bucket>() as u64;
    let r_size = r_size as u64;
    let llc_size_bytes = llc_size_bytes as u64;

    let ratio_trigger = bucket_bytes * r_size / (llc_size_bytes * 6 / 5);
    if ratio_trigger < 1 {
        return (0, 0);
    }

    let ratio = bucket_bytes * r_size / (llc_size_bytes * 2 / 3);
    let bits = lg_ceil_u64(ratio.max(1));
    (bits, bits)
}

fn lg_ceil_u64(n: u64) -> u32 {
    assert!(n >= 1);
    let floor = 63 - n.leading_zeros();
    floor + u32::from((1u64 << floor) != n)
}

/// Validates that a chosen fanout divides evenly into the number of
/// utilized LLC groups, the precondition every ICP call and ColBP model
/// relies on for its group-swap iteration count.
pub fn check_fanout_divides_groups(radix_bits: u32, num_groups: u32) -> Result<(), JoinError> {
    let fanout = 1u32 << radix_bits;
    if fanout % num_groups != 0 {
        return Err(JoinError::FanoutNotDivisibleByGroups {
            fanout_bits: radix_bits,
            num_groups,
        });
    }
    Ok(())
}
