use thiserror::Error;

/// Represents errors that can occur within the target-kind registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Target kind tag {0} is already registered")]
    DuplicateTag(i16),

    #[error("Target kind name {0:?} is already registered")]
    DuplicateName(&'static str),

    #[error("No target kind registered for tag {0}")]
    UnknownTag(i16),
}
