//! Top-level error type, aggregating every per-crate error this binary
//! can surface via `#[from]` -- the single point `main` matches on to
//! print a message and exit non-zero.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Topology(#[from] topology::TopologyError),

    #[error(transparent)]
    DataGen(#[from] datagen::DataGenError),

    #[error(transparent)]
    Orchestrate(#[from] orchestrate::OrchestrateError),

    #[error(transparent)]
    Join(#[from] join_core::JoinError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("relation R must have at least one tuple (got --r 0)")]
    EmptyPrimaryRelation,

    #[error("relation S must have at least one tuple (got --s 0)")]
    EmptySecondaryRelation,

    #[error("--threads 0 is not a valid worker count")]
    ZeroThreads,
}

pub type Result<T> = std::result::Result<T, Error>;
