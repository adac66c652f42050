//! Bulk vote coordinator.
//!
//! Batch variants of the single-vote operations. Regardless of batch size,
//! each operation performs a bounded number of store round-trips: two batch
//! counts, then one transaction holding one bulk delete, at most one bulk
//! insert, and one counter update. The counter adjustment is derived as a
//! single arithmetic update, so no intermediate inconsistent state is ever
//! visible to other readers.
use crate::engine::VoteEngine;
use crate::errors::VoteEngineError;
use crate::rate::upvote_rate;
use crate::votable::VotableEntity;
use std::collections::HashSet;
use tracing::{debug, instrument};
use votes_shared::types::{BulkChange, VoteDirection, VoterId};

/// Drops duplicate ids while keeping first-occurrence order, so batch
/// arithmetic counts each voter exactly once.
fn dedupe(voter_ids: &[VoterId]) -> Vec<VoterId> {
    let mut seen = HashSet::with_capacity(voter_ids.len());
    voter_ids
        .iter()
        .copied()
        .filter(|voter_id| seen.insert(*voter_id))
        .collect()
}

impl VoteEngine {
    /// Sets every listed voter's vote on the entity to `direction`.
    ///
    /// Existing records for the listed voters are removed with one bulk
    /// delete and replaced with fresh records (so `created_at` resets for
    /// every voter in the batch). The `direction` counter grows by the batch
    /// size minus the votes that already matched; the opposite counter
    /// shrinks by the conflicting votes. Duplicate ids in the batch are
    /// counted once.
    ///
    /// # Returns
    ///
    /// The number of records written.
    #[instrument(skip(self, entity, voter_ids), fields(entity = %entity.vote_target(), batch_size = voter_ids.len()))]
    pub async fn bulk_set<E: VotableEntity>(
        &self,
        entity: &mut E,
        voter_ids: &[VoterId],
        direction: VoteDirection,
    ) -> Result<usize, VoteEngineError> {
        let voter_ids = dedupe(voter_ids);
        if voter_ids.is_empty() {
            return Ok(0);
        }
        let target = entity.vote_target();

        let matching = self
            .repository
            .count_in(target, &voter_ids, Some(direction))
            .await?;
        let conflicting = self
            .repository
            .count_in(target, &voter_ids, Some(direction.opposite()))
            .await?;

        let added = voter_ids.len() as i64;
        let (up_delta, down_delta) = match direction {
            VoteDirection::Up => (added - matching, -conflicting),
            VoteDirection::Down => (-conflicting, added - matching),
        };

        self.commit_bulk(entity, &voter_ids, Some(direction), up_delta, down_delta)
            .await?;
        Ok(voter_ids.len())
    }

    /// Retracts every listed voter's vote on the entity.
    ///
    /// One bulk delete removes the records; both counters shrink by the
    /// respective number of removed votes and the rate is recomputed once.
    ///
    /// # Returns
    ///
    /// The number of records removed.
    #[instrument(skip(self, entity, voter_ids), fields(entity = %entity.vote_target(), batch_size = voter_ids.len()))]
    pub async fn bulk_retract<E: VotableEntity>(
        &self,
        entity: &mut E,
        voter_ids: &[VoterId],
    ) -> Result<usize, VoteEngineError> {
        let voter_ids = dedupe(voter_ids);
        if voter_ids.is_empty() {
            return Ok(0);
        }
        let target = entity.vote_target();

        let upvoted = self
            .repository
            .count_in(target, &voter_ids, Some(VoteDirection::Up))
            .await?;
        let downvoted = self
            .repository
            .count_in(target, &voter_ids, Some(VoteDirection::Down))
            .await?;

        self.commit_bulk(entity, &voter_ids, None, -upvoted, -downvoted)
            .await?;
        Ok((upvoted + downvoted) as usize)
    }

    /// Persists one bulk transition atomically, then mirrors the committed
    /// counters into the entity.
    async fn commit_bulk<E: VotableEntity>(
        &self,
        entity: &mut E,
        voter_ids: &[VoterId],
        insert: Option<VoteDirection>,
        up_delta: i64,
        down_delta: i64,
    ) -> Result<(), VoteEngineError> {
        let target = entity.vote_target();
        let counts = entity.vote_counts();
        let up_count = counts.up_count + up_delta;
        let down_count = counts.down_count + down_delta;
        let new_rate = upvote_rate(up_count, down_count);

        self.repository
            .apply_bulk(&BulkChange {
                target,
                remove_voter_ids: voter_ids,
                insert: insert.map(|direction| (voter_ids, direction)),
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
            "Bulk vote transition committed"
        );
        Ok(())
    }
}
