use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataGenError {
    #[error("relation R must have at least one tuple to generate foreign keys against")]
    EmptyPrimaryRelation,

    #[error("invalid Zipf skew parameter z={z}: {reason}")]
    InvalidSkew { z: f64, reason: String },
}
