//! Error types for the votes engine.
//! Consolidates errors from the engine's own modules and from the
//! underlying vote store.
mod engine;
mod registry;

pub use engine::VoteEngineError;
pub use registry::RegistryError;
