//! The seam between application entity types and the vote engine.
use votes_shared::types::{TargetRef, VoteCounts};

/// Implemented by any application type that owns aggregate vote counters.
///
/// This is explicit composition rather than inheritance: an entity embeds a
/// `VoteCounts` and exposes a polymorphic target reference, and the engine
/// keeps the embedded counters mirroring the durable ones. The durable copy
/// stays the source of truth; the engine writes the embedded copy only after
/// a transition has committed.
pub trait VotableEntity {
    /// The polymorphic reference persisted with this entity's vote records.
    fn vote_target(&self) -> TargetRef;

    /// The entity's aggregate counters.
    fn vote_counts(&self) -> &VoteCounts;

    /// Mutable access used by the engine to mirror committed updates.
    fn vote_counts_mut(&mut self) -> &mut VoteCounts;
}

/// A ready-made votable handle for callers that do not embed the counters
/// in a richer type.
#[derive(Debug, Clone, PartialEq)]
pub struct Votable {
    target: TargetRef,
    counts: VoteCounts,
}

impl Votable {
    /// Creates a handle with zeroed counters.
    pub fn new(target: TargetRef) -> Self {
        Self {
            target,
            counts: VoteCounts::default(),
        }
    }

    /// Creates a handle around counters already loaded from the store.
    pub fn with_counts(target: TargetRef, counts: VoteCounts) -> Self {
        Self { target, counts }
    }
}

impl VotableEntity for Votable {
    fn vote_target(&self) -> TargetRef {
        self.target
    }

    fn vote_counts(&self) -> &VoteCounts {
        &self.counts
    }

    fn vote_counts_mut(&mut self) -> &mut VoteCounts {
        &mut self.counts
    }
}
