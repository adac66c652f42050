use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable tag identifying a votable entity kind.
///
/// Each application type that wants voting registers one stable tag at
/// startup; the tag is what gets persisted, so it must never be reassigned
/// once records exist.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKind(i16);

impl TargetKind {
    /// Creates a target kind from its stable tag.
    pub const fn new(tag: i16) -> Self {
        Self(tag)
    }

    /// Returns the stable tag backing this kind.
    pub const fn tag(self) -> i16 {
        self.0
    }
}

/// Polymorphic reference to a votable entity.
///
/// A `TargetRef` is a (kind, id) pair, so a single vote-record store can be
/// shared across every entity kind in the application.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: i64,
}

impl TargetRef {
    /// Creates a reference to the entity of `kind` with the given id.
    pub fn new(kind: TargetKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.tag(), self.id)
    }
}
