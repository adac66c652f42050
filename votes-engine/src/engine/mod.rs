//! Single-vote operations of the vote-aggregation engine.
//!
//! `VoteEngine` owns the transition rules for a single voter's state on a
//! target: first vote, direction flip, no-op repeat, and retraction. Every
//! transition is persisted as one atomic unit (the record mutation together
//! with a relative counter update and the recomputed rate), and the entity's
//! in-memory counters are only updated after that unit commits.
mod bulk;

use crate::errors::VoteEngineError;
use crate::rate::upvote_rate;
use crate::votable::VotableEntity;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{debug, warn};
use votes_repository::{VoteRepository, VoteStoreError};
use votes_shared::types::{
    PopularFilter, TargetKind, TargetRef, VoteChange, VoteDirection, VoteMutation, VoteTotals,
    VoterId,
};

/// The vote-aggregation engine.
///
/// Constructed once per process around a repository handle and passed to
/// whatever needs vote operations; entities themselves stay plain data.
pub struct VoteEngine {
    repository: Arc<dyn VoteRepository>,
}

impl VoteEngine {
    /// Creates a new engine instance.
    ///
    /// # Arguments
    ///
    /// * `repository` - An `Arc` trait object that implements
    ///   `VoteRepository`, providing the interface for data persistence.
    pub fn new(repository: Arc<dyn VoteRepository>) -> Self {
        Self { repository }
    }

    /// Records an upvote by `voter_id` on the entity.
    ///
    /// # Returns
    ///
    /// `Ok(true)` when a record was created or flipped, `Ok(false)` when the
    /// voter already had a live upvote and nothing changed.
    pub async fn upvote<E: VotableEntity>(
        &self,
        entity: &mut E,
        voter_id: VoterId,
    ) -> Result<bool, VoteEngineError> {
        self.cast(entity, voter_id, VoteDirection::Up).await
    }

    /// Records a downvote by `voter_id` on the entity. Symmetric to
    /// [`upvote`](Self::upvote).
    pub async fn downvote<E: VotableEntity>(
        &self,
        entity: &mut E,
        voter_id: VoterId,
    ) -> Result<bool, VoteEngineError> {
        self.cast(entity, voter_id, VoteDirection::Down).await
    }

    /// Retracts `voter_id`'s live vote on the entity, if any.
    ///
    /// Deletes the record and decrements the matching counter. A later vote
    /// by the same voter creates a fresh record with a fresh `created_at`.
    ///
    /// # Returns
    ///
    /// `Ok(true)` when a record was removed, `Ok(false)` when the voter had
    /// no live vote.
    pub async fn retract<E: VotableEntity>(
        &self,
        entity: &mut E,
        voter_id: VoterId,
    ) -> Result<bool, VoteEngineError> {
        let target = entity.vote_target();
        let Some(record) = self.repository.find(voter_id, target).await? else {
            return Ok(false);
        };
        let (up_delta, down_delta) = match record.direction {
            VoteDirection::Up => (-1, 0),
            VoteDirection::Down => (0, -1),
        };
        self.commit(
            entity,
            VoteMutation::Delete {
                record_id: record.id,
            },
            up_delta,
            down_delta,
        )
        .await?;
        Ok(true)
    }

    /// Whether `voter_id` has a live upvote on the entity.
    pub async fn is_upvoted_by<E: VotableEntity>(
        &self,
        entity: &E,
        voter_id: VoterId,
    ) -> Result<bool, VoteEngineError> {
        self.has_direction(entity, voter_id, Some(VoteDirection::Up))
            .await
    }

    /// Whether `voter_id` has a live downvote on the entity.
    pub async fn is_downvoted_by<E: VotableEntity>(
        &self,
        entity: &E,
        voter_id: VoterId,
    ) -> Result<bool, VoteEngineError> {
        self.has_direction(entity, voter_id, Some(VoteDirection::Down))
            .await
    }

    /// Whether `voter_id` has any live vote on the entity.
    pub async fn has_voted_by<E: VotableEntity>(
        &self,
        entity: &E,
        voter_id: VoterId,
    ) -> Result<bool, VoteEngineError> {
        self.has_direction(entity, voter_id, None).await
    }

    /// Streams the ids of voters with live votes on the entity, optionally
    /// filtered by direction, newest vote first. Lazy and unbounded.
    pub fn voters<E: VotableEntity>(
        &self,
        entity: &E,
        direction: Option<VoteDirection>,
    ) -> BoxStream<'static, Result<VoterId, VoteStoreError>> {
        self.repository.list_voters(entity.vote_target(), direction)
    }

    /// Streams the targets of `kind` that `voter_id` has live votes on,
    /// optionally filtered by direction, newest vote first.
    pub fn voted_targets(
        &self,
        voter_id: VoterId,
        kind: TargetKind,
        direction: Option<VoteDirection>,
    ) -> BoxStream<'static, Result<TargetRef, VoteStoreError>> {
        self.repository.list_targets(voter_id, kind, direction)
    }

    /// Idempotently registers the entity's counter row in the store.
    ///
    /// Vote operations require the row to exist; a vote against an
    /// unregistered entity surfaces `EntityNotFound`.
    pub async fn track<E: VotableEntity>(&self, entity: &E) -> Result<(), VoteEngineError> {
        self.repository.register(entity.vote_target()).await?;
        Ok(())
    }

    /// Hydrates the stored totals for a target, if it is registered.
    pub async fn totals(&self, target: TargetRef) -> Result<Option<VoteTotals>, VoteEngineError> {
        let counts = self.repository.fetch_counts(target).await?;
        Ok(counts.map(|counts| VoteTotals { target, counts }))
    }

    /// Returns the entities passing the popularity thresholds, ordered by
    /// `up_count` descending and truncated to the filter's limit.
    pub async fn popular(
        &self,
        filter: &PopularFilter,
    ) -> Result<Vec<VoteTotals>, VoteEngineError> {
        let totals = self.repository.popular(filter).await?;
        Ok(totals)
    }

    /// Casts a vote, retrying once when a concurrent voter won the
    /// read-check-write race for the same (voter, target) pair.
    async fn cast<E: VotableEntity>(
        &self,
        entity: &mut E,
        voter_id: VoterId,
        direction: VoteDirection,
    ) -> Result<bool, VoteEngineError> {
        match self.try_cast(entity, voter_id, direction).await {
            Err(VoteEngineError::Store(err)) if err.is_duplicate_vote() => {
                warn!(
                    voter_id,
                    entity = %entity.vote_target(),
                    "Concurrent vote detected, retrying with a refreshed read"
                );
                self.try_cast(entity, voter_id, direction).await
            }
            result => result,
        }
    }

    /// One read-check-write pass: look up the voter's record, decide the
    /// transition, and commit it atomically.
    async fn try_cast<E: VotableEntity>(
        &self,
        entity: &mut E,
        voter_id: VoterId,
        direction: VoteDirection,
    ) -> Result<bool, VoteEngineError> {
        let target = entity.vote_target();
        let existing = self.repository.find(voter_id, target).await?;

        let (mutation, up_delta, down_delta) = match existing {
            None => {
                let (up_delta, down_delta) = match direction {
                    VoteDirection::Up => (1, 0),
                    VoteDirection::Down => (0, 1),
                };
                (
                    VoteMutation::Create {
                        voter_id,
                        direction,
                    },
                    up_delta,
                    down_delta,
                )
            }
            Some(record) if record.direction == direction => {
                debug!(voter_id, entity = %target, "Vote already recorded in this direction");
                return Ok(false);
            }
            Some(record) => {
                let (up_delta, down_delta) = match direction {
                    VoteDirection::Up => (1, -1),
                    VoteDirection::Down => (-1, 1),
                };
                (
                    VoteMutation::SetDirection {
                        record_id: record.id,
                        direction,
                    },
                    up_delta,
                    down_delta,
                )
            }
        };

        self.commit(entity, mutation, up_delta, down_delta).await?;
        Ok(true)
    }

    /// Persists one transition atomically, then mirrors the committed
    /// counters into the entity. The rate is always recomputed from the
    /// post-mutation counts.
    async fn commit<E: VotableEntity>(
        &self,
        entity: &mut E,
        mutation: VoteMutation,
        up_delta: i64,
        down_delta: i64,
    ) -> Result<(), VoteEngineError> {
        let target = entity.vote_target();
        let counts = entity.vote_counts();
        let up_count = counts.up_count + up_delta;
        let down_count = counts.down_count + down_delta;
        let new_rate = upvote_rate(up_count, down_count);

        self.repository
            .apply_vote(&VoteChange {
                target,
                mutation,
                up_delta,
                down_delta,
                new_rate,
            })
            .await?;

        let counts = entity.vote_counts_mut();
        counts.up_count = up_count;
        counts.down_count = down_count;
        counts.upvote_rate = new_rate;
        debug!(
            entity = %target,
            up_count,
            down_count,
            rate = new_rate,
            "Vote transition committed"
        );
        Ok(())
    }

    async fn has_direction<E: VotableEntity>(
        &self,
        entity: &E,
        voter_id: VoterId,
        direction: Option<VoteDirection>,
    ) -> Result<bool, VoteEngineError> {
        let record = self.repository.find(voter_id, entity.vote_target()).await?;
        Ok(match (record, direction) {
            (Some(record), Some(direction)) => record.direction == direction,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }
}
