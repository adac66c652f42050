//! # Votes Shared
//! This crate defines shared data structures and types used across the votes
//! workspace. It includes common definitions for vote directions, polymorphic
//! target references, vote records, aggregate counters, and change sets.
pub mod types;
