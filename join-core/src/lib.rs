//! Core join engine: in-place cache-aware partitioning, a skew detector
//! that can switch the partitioning scheme mid-flight, and the four
//! Collaborative Build/Probe models that swap partitions across LLC
//! groups under strict barrier discipline.
//!
//! This crate has no workspace-internal dependencies. It is the single
//! source of truth for every invariant that makes the join correct
//! (barrier protocol, in-place partitioning, hash table sizing), so
//! callers -- `orchestrate` for thread/barrier setup, `polyhj` for
//! wiring everything together -- depend on it rather than the other way
//! around.

pub mod aggregate;
pub mod colbp;
pub mod error;
pub mod icp;
pub mod model_selector;
pub mod sync;
pub mod types;

pub use colbp::JoinStats;
pub use error::JoinError;
pub use icp::{icp as partition, model_iii_shift, SkewState};
pub use model_selector::{check_fanout_divides_groups, initial_fanout, select_model, Model};
pub use sync::{BarrierA, SBarrier};
pub use types::{
    Block, BlockMeta, Bucket, Key, Payload, RadixConfig, RelationId, SkewThresholds, SubRelation,
    Tuple,
};
