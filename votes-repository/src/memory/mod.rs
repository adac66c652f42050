//! In-memory backend for the votes repository.
//! Used as a test double for engine tests and for embedded use where no
//! database is available.
mod vote_repository;

pub use vote_repository::MemoryVoteRepository;
