//! Error types for the ranking engine.

use thiserror::Error;

use crate::types::{ItemId, Pair};

/// A declined engine operation. Whenever one of these is returned the
/// collection, the pair and the pending removals are exactly as they were
/// before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Two ingested items share an id.
    #[error("Duplicate item ID: {0}")]
    DuplicateId(ItemId),

    /// An ingested item is rated below the floor.
    #[error("Item {id} has score {score}, below the floor of {floor}")]
    ScoreBelowFloor { id: ItemId, score: i32, floor: i32 },

    /// The id is not in the live collection.
    #[error("Unknown item ID: {0}")]
    UnknownItem(ItemId),

    /// The id was already removed and its grace period is still running.
    #[error("Item {0} is already pending removal")]
    AlreadyPending(ItemId),

    /// Nothing is being compared right now (fewer than two items, or no
    /// selection has been made yet).
    #[error("No active pair")]
    NoActivePair,

    /// An `EngineConfig` value is out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The caller acted on a pair that is no longer the one on screen.
    #[error("Pair {given:?} does not match the active pair {active:?}")]
    StalePair { given: Pair, active: Pair },
}

/// A durable write that did not go through. Reported, never retried by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PersistenceError(pub String);

impl PersistenceError {
    pub fn new(msg: impl Into<String>) -> Self {
        PersistenceError(msg.into())
    }
}
