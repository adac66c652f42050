//! Error types for the vote store.
//! Defines specific errors that can occur during storage operations on vote
//! records and aggregate counters.
use thiserror::Error;
use votes_shared::types::{RecordId, TargetRef, VoterId};

/// Represents errors that can occur within the vote store.
///
/// This enum consolidates various error conditions specific to storage
/// interactions, such as SQLx errors during database operations, unique
/// constraint violations, and references to missing rows.
#[derive(Debug, Error)]
pub enum VoteStoreError {
    /// Transient storage failure, surfaced to the caller once the storage
    /// layer's own retry policy is exhausted.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A second live record for the same (voter, target) was attempted.
    /// Indicates a concurrent read-check-write race; callers retry once
    /// with a refreshed read.
    #[error("Voter {voter_id} already has a live vote on {target}")]
    DuplicateVote { voter_id: VoterId, target: TargetRef },

    /// No counter row exists for the referenced entity.
    #[error("No counter row for entity {0}")]
    EntityNotFound(TargetRef),

    /// No vote record exists with the referenced id.
    #[error("No vote record with id {0}")]
    RecordNotFound(RecordId),

    /// A stored direction value outside the known encoding was read back.
    #[error("Invalid vote direction: {0}")]
    InvalidDirection(i16),
}

impl VoteStoreError {
    /// Returns `true` when the error is the unique-constraint race that the
    /// engine retries once with a refreshed read.
    pub fn is_duplicate_vote(&self) -> bool {
        matches!(self, VoteStoreError::DuplicateVote { .. })
    }
}
