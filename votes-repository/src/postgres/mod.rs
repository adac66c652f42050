//! PostgreSQL backend for the votes repository.
//! Re-exports the repository implementation and holds the direction encoding
//! shared by its queries.
mod vote_repository;

pub use vote_repository::PostgresVoteRepository;

use crate::errors::VoteStoreError;
use votes_shared::types::VoteDirection;

/// Smallint encoding of a vote direction as stored in `vote_records`.
pub(crate) fn direction_to_smallint(direction: VoteDirection) -> i16 {
    match direction {
        VoteDirection::Up => 0,
        VoteDirection::Down => 1,
    }
}

/// Decodes a stored smallint back into a vote direction.
pub(crate) fn direction_from_smallint(value: i16) -> Result<VoteDirection, VoteStoreError> {
    match value {
        0 => Ok(VoteDirection::Up),
        1 => Ok(VoteDirection::Down),
        _ => Err(VoteStoreError::InvalidDirection(value)),
    }
}

/// Runs the embedded schema migrations against the given pool.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), VoteStoreError> {
    sqlx::migrate!("src/postgres/migrations")
        .run(pool)
        .await
        .map_err(|e| VoteStoreError::Database(e.into()))
}
