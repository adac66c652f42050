use crate::types::{RecordId, TargetRef, VoteDirection, VoterId};

/// A single vote-record transition decided by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteMutation {
    /// Create a fresh record for a voter with no live vote on the target.
    Create {
        voter_id: VoterId,
        direction: VoteDirection,
    },
    /// Flip an existing record to the other direction, preserving its
    /// `created_at`.
    SetDirection {
        record_id: RecordId,
        direction: VoteDirection,
    },
    /// Delete an existing record (vote retraction).
    Delete { record_id: RecordId },
}

/// Represents one voter's transition on one target plus the matching counter
/// adjustment.
///
/// A `VoteChange` bundles the record mutation with the relative counter
/// deltas and the recomputed rate so the repository can persist both as one
/// atomic unit. The deltas are applied with a relative update on the stored
/// integers, never a read-modify-write of a cached value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteChange {
    pub target: TargetRef,
    pub mutation: VoteMutation,
    pub up_delta: i64,
    pub down_delta: i64,
    pub new_rate: f64,
}

/// Represents a bulk transition on one target for a batch of voters.
///
/// All listed voters' existing records are removed with a single bulk
/// delete; when `insert` is set, one fresh record per voter is written with
/// a single bulk insert. The counter adjustment is a single arithmetic
/// update covering the net effect, so no intermediate inconsistent state is
/// ever visible to other readers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulkChange<'a> {
    pub target: TargetRef,
    pub remove_voter_ids: &'a [VoterId],
    pub insert: Option<(&'a [VoterId], VoteDirection)>,
    pub up_delta: i64,
    pub down_delta: i64,
    pub new_rate: f64,
}
