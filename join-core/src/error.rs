use thiserror::Error;

/// Configuration-level failures the join core can detect before doing
/// any partitioning or build/probe work. Anything beyond this is a
/// programmer error (an impossible radix combination, a fanout that
/// doesn't divide the group count) and is asserted against instead of
/// represented here, per the fail-fast policy the rest of this
/// workspace follows.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("fanout 2^{fanout_bits} does not divide evenly into {num_groups} LLC group(s)")]
    FanoutNotDivisibleByGroups { fanout_bits: u32, num_groups: u32 },

    #[error("radix configuration (R_bits={r}, S_bits={s}) does not correspond to any ColBP model")]
    UnreachableRadixCombination { r: u32, s: u32 },

    #[error("relation R must be non-empty to build a key-indexed hash table")]
    EmptyPrimaryRelation,
}
