//! # Votes Engine
//!
//! Core of the vote-aggregation system: single-vote state transitions, the
//! bulk vote coordinator, the upvote-rate calculator, the target-kind
//! registry, and dependency wiring around a `VoteRepository`.

pub mod config;
pub mod engine;
pub mod errors;
pub mod rate;
pub mod registry;
pub mod votable;

pub use config::Dependencies;
pub use engine::VoteEngine;
pub use errors::{RegistryError, VoteEngineError};
pub use registry::TargetKinds;
pub use votable::{Votable, VotableEntity};
