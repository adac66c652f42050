//! # Votes Repository
//! This crate provides traits and implementations for interacting with the
//! vote data repository. It includes definitions for errors, interfaces, a
//! concrete implementation for PostgreSQL, and an in-memory implementation
//! for tests and embedded use.
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod postgres;

pub use errors::VoteStoreError;
pub use interfaces::VoteRepository;
pub use memory::MemoryVoteRepository;
pub use postgres::PostgresVoteRepository;
