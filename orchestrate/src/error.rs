use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestrateError {
    #[error(
        "cannot run {requested} threads: host exposes only {available} hardware contexts"
    )]
    NotEnoughHardwareContexts { requested: u32, available: usize },

    #[error("failed to pin worker {tid} to hardware context {os_id}")]
    PinningFailed { tid: u32, os_id: usize },
}
