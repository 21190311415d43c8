use crate::contest::EntityId;

/// Why a historical contest was rejected during replay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContestError {
    #[error("contest is missing an entity identifier")]
    MissingIdentifier,

    #[error("entity {0} cannot play itself")]
    SameEntity(EntityId),

    #[error("contest has no kickoff time")]
    MissingKickoff,

    #[error("contest is missing a final score")]
    MissingGoals,

    #[error("negative goals in contest: {home}-{away}")]
    NegativeGoals { home: i32, away: i32 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("entity {0} has no rating history and baseline fallback is disabled")]
    UnknownEntity(EntityId),

    #[error("invalid fixture: {0}")]
    InvalidFixture(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blend or matrix stage broke its own invariant. Not a data problem.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
