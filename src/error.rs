use crate::model::structures::{partition::Partition, ratable_entity::EntityId};
use thiserror::Error;

/// Failures raised by an entity or snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Stale write for entity {0}")]
    StaleWrite(EntityId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String)
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Entity {id} not found")]
    NotFound { id: EntityId },

    #[error("Invalid match result: {0}")]
    InvalidMatch(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Ranking run for {partition} failed: {reason}")]
    PartitionRunFailure { partition: Partition, reason: String },

    #[error("Transient store error: {0}")]
    TransientStore(StoreError)
}

impl EngineError {
    /// Whether running the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ConcurrencyConflict(_) | EngineError::TransientStore(_)
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::StaleWrite(id) => {
                EngineError::ConcurrencyConflict(format!("entity {} was modified concurrently", id))
            }
            other => EngineError::TransientStore(other)
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
