use crate::errors::RegistryError;
use thiserror::Error;
use votes_repository::VoteStoreError;

/// Represents errors that can occur within the vote engine.
///
/// Store errors pass through with their kind intact: missing rows surface
/// to the caller unretried, duplicate-vote races are retried once by the
/// engine before propagating, and database errors surface once the storage
/// layer's own handling is exhausted.
#[derive(Debug, Error)]
pub enum VoteEngineError {
    #[error("Vote store error: {0}")]
    Store(#[from] VoteStoreError),

    #[error("Target kind registry error: {0}")]
    Registry(#[from] RegistryError),
}
