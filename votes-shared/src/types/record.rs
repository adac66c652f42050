use crate::types::{RecordId, TargetRef, VoteDirection, VoterId};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Represents a single user's live vote on a target entity.
///
/// At most one record exists per (voter, target) at any time. The record is
/// created when a voter first votes, flipped in place when they change their
/// vote, and deleted when they retract. Bulk operations replace records
/// wholesale, so `created_at` resets for every voter they touch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteRecord {
    pub id: RecordId,
    pub voter_id: VoterId,
    pub target: TargetRef,
    pub direction: VoteDirection,
    pub created_at: OffsetDateTime,
}
