//! Typed error hierarchy for the board synchronization core.
//!
//! `SyncError` is the one error type surfaced by the engine, the reconciler
//! and the session manager. Gateway implementations use `anyhow` internally
//! and convert at their boundary:
//! - `Network`: a remote call was rejected or could not complete
//! - `NotFound`: a mutation references an entity that no longer exists
//! - `Validation`: bad input or a malformed row, rejected before any change
//! - `Subscription`: the change feed could not be established

use thiserror::Error;
use uuid::Uuid;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote call failed: {0}")]
    Network(#[source] anyhow::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Change feed subscription failed: {0}")]
    Subscription(String),

    #[error("Board {board_id} was created but only partially initialized: {source}")]
    PartiallyInitialized {
        board_id: Uuid,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Entity store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn board_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "Board", id }
    }

    pub fn column_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "Column", id }
    }

    pub fn task_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "Task", id }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
