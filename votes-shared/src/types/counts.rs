use crate::types::TargetRef;
use serde::{Deserialize, Serialize};

/// Represents the aggregate vote counters owned by a votable entity.
///
/// The counters always equal the live number of vote records referencing the
/// entity with the matching direction, and `upvote_rate` is derived from the
/// counters. The durable copy is the source of truth; an in-memory copy is
/// only updated once the matching record mutation has been persisted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct VoteCounts {
    pub up_count: i64,
    pub down_count: i64,
    pub upvote_rate: f64,
}

impl VoteCounts {
    /// Total number of live votes on the entity.
    pub fn total(&self) -> i64 {
        self.up_count + self.down_count
    }
}

/// Aggregate counters together with the entity they belong to, as returned
/// by counter-row queries such as the popularity filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VoteTotals {
    pub target: TargetRef,
    pub counts: VoteCounts,
}
