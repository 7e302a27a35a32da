//! Router error types.

use thiserror::Error;

/// Errors that can occur during routing operations.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("shard not found: {0}")]
    ShardNotFound(String),

    #[error("tenant {tenant_id} is already registered on shard {shard_id}")]
    AlreadyRegistered { tenant_id: String, shard_id: String },

    /// No known shard has spare capacity; the caller should provision one.
    #[error("no shard has spare capacity")]
    CapacityExhausted,

    #[error("state store error: {0}")]
    State(#[from] fedplane_state::StateError),
}

pub type RouterResult<T> = Result<T, RouterError>;
