//! Health monitor error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("shard not found: {0}")]
    ShardNotFound(String),

    #[error("tls configuration error: {0}")]
    Tls(String),

    #[error("state store error: {0}")]
    State(#[from] fedplane_state::StateError),
}

pub type HealthResult<T> = Result<T, HealthError>;
