//! Lifecycle error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("shard not found: {0}")]
    ShardNotFound(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("shard already exists: {0}")]
    ShardExists(String),

    /// A provisioning step failed. The project record is left in `error`
    /// status for the cleanup sweep.
    #[error("provisioning shard {shard_id} failed at {step}: {reason}")]
    Provisioning {
        shard_id: String,
        step: String,
        reason: String,
    },

    #[error("state store error: {0}")]
    State(#[from] fedplane_state::StateError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
