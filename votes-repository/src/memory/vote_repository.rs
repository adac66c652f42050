//! In-memory implementation of the votes repository.
//!
//! All state lives behind a single mutex, so every operation, including the
//! composite `apply_vote` / `apply_bulk`, is atomic with respect to other
//! callers, mirroring the transactional guarantees of the PostgreSQL
//! backend. Error mapping matches the PostgreSQL implementation: a second
//! live record for a (voter, target) pair surfaces as `DuplicateVote`, a
//! missing counter row as `EntityNotFound`.
use crate::errors::VoteStoreError;
use crate::interfaces::VoteRepository;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use votes_shared::types::{
    BulkChange, PopularFilter, RecordId, TargetKind, TargetRef, VoteChange, VoteCounts,
    VoteDirection, VoteMutation, VoteRecord, VoteTotals, VoterId,
};

#[derive(Default)]
struct State {
    next_record_id: RecordId,
    records: Vec<VoteRecord>,
    counters: HashMap<TargetRef, VoteCounts>,
}

impl State {
    fn has_record(&self, target: TargetRef, voter_id: VoterId) -> bool {
        self.records
            .iter()
            .any(|r| r.target == target && r.voter_id == voter_id)
    }

    fn insert_record(
        &mut self,
        target: TargetRef,
        voter_id: VoterId,
        direction: VoteDirection,
    ) -> VoteRecord {
        self.next_record_id += 1;
        let record = VoteRecord {
            id: self.next_record_id,
            voter_id,
            target,
            direction,
            created_at: OffsetDateTime::now_utc(),
        };
        self.records.push(record.clone());
        record
    }

    /// Applies a single record mutation, leaving the state untouched on
    /// error.
    fn apply_mutation(
        &mut self,
        target: TargetRef,
        mutation: VoteMutation,
    ) -> Result<(), VoteStoreError> {
        match mutation {
            VoteMutation::Create {
                voter_id,
                direction,
            } => {
                if self.has_record(target, voter_id) {
                    return Err(VoteStoreError::DuplicateVote { voter_id, target });
                }
                self.insert_record(target, voter_id, direction);
                Ok(())
            }
            VoteMutation::SetDirection {
                record_id,
                direction,
            } => match self.records.iter_mut().find(|r| r.id == record_id) {
                Some(record) => {
                    record.direction = direction;
                    Ok(())
                }
                None => Err(VoteStoreError::RecordNotFound(record_id)),
            },
            VoteMutation::Delete { record_id } => {
                match self.records.iter().position(|r| r.id == record_id) {
                    Some(index) => {
                        self.records.remove(index);
                        Ok(())
                    }
                    None => Err(VoteStoreError::RecordNotFound(record_id)),
                }
            }
        }
    }
}

/// In-memory implementation of the votes repository.
#[derive(Default)]
pub struct MemoryVoteRepository {
    state: Mutex<State>,
}

impl MemoryVoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Matching records, newest vote first.
    fn sorted_matches<F>(&self, matches: F) -> Vec<VoteRecord>
    where
        F: Fn(&VoteRecord) -> bool,
    {
        let state = self.state();
        let mut records: Vec<VoteRecord> = state.records.iter().filter(|r| matches(r)).cloned().collect();
        records.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        records
    }
}

#[async_trait]
impl VoteRepository for MemoryVoteRepository {
    async fn find(
        &self,
        voter_id: VoterId,
        target: TargetRef,
    ) -> Result<Option<VoteRecord>, VoteStoreError> {
        let state = self.state();
        Ok(state
            .records
            .iter()
            .find(|r| r.target == target && r.voter_id == voter_id)
            .cloned())
    }

    async fn count(
        &self,
        target: TargetRef,
        direction: Option<VoteDirection>,
    ) -> Result<i64, VoteStoreError> {
        let state = self.state();
        let count = state
            .records
            .iter()
            .filter(|r| r.target == target && direction.is_none_or(|d| r.direction == d))
            .count();
        Ok(count as i64)
    }

    async fn count_in(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
        direction: Option<VoteDirection>,
    ) -> Result<i64, VoteStoreError> {
        let voters: HashSet<VoterId> = voter_ids.iter().copied().collect();
        let state = self.state();
        let count = state
            .records
            .iter()
            .filter(|r| {
                r.target == target
                    && voters.contains(&r.voter_id)
                    && direction.is_none_or(|d| r.direction == d)
            })
            .count();
        Ok(count as i64)
    }

    async fn create(
        &self,
        target: TargetRef,
        voter_id: VoterId,
        direction: VoteDirection,
    ) -> Result<VoteRecord, VoteStoreError> {
        let mut state = self.state();
        if state.has_record(target, voter_id) {
            return Err(VoteStoreError::DuplicateVote { voter_id, target });
        }
        Ok(state.insert_record(target, voter_id, direction))
    }

    async fn update_direction(
        &self,
        record_id: RecordId,
        direction: VoteDirection,
    ) -> Result<(), VoteStoreError> {
        let mut state = self.state();
        match state.records.iter_mut().find(|r| r.id == record_id) {
            Some(record) => {
                record.direction = direction;
                Ok(())
            }
            None => Err(VoteStoreError::RecordNotFound(record_id)),
        }
    }

    async fn delete(&self, record_id: RecordId) -> Result<(), VoteStoreError> {
        let mut state = self.state();
        match state.records.iter().position(|r| r.id == record_id) {
            Some(index) => {
                state.records.remove(index);
                Ok(())
            }
            None => Err(VoteStoreError::RecordNotFound(record_id)),
        }
    }

    async fn bulk_delete(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
    ) -> Result<u64, VoteStoreError> {
        let voters: HashSet<VoterId> = voter_ids.iter().copied().collect();
        let mut state = self.state();
        let before = state.records.len();
        state
            .records
            .retain(|r| !(r.target == target && voters.contains(&r.voter_id)));
        Ok((before - state.records.len()) as u64)
    }

    async fn bulk_create(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
        direction: VoteDirection,
    ) -> Result<(), VoteStoreError> {
        let mut state = self.state();
        for &voter_id in voter_ids {
            if state.has_record(target, voter_id) {
                return Err(VoteStoreError::DuplicateVote { voter_id, target });
            }
        }
        for &voter_id in voter_ids {
            state.insert_record(target, voter_id, direction);
        }
        Ok(())
    }

    fn list_voters(
        &self,
        target: TargetRef,
        direction: Option<VoteDirection>,
    ) -> BoxStream<'static, Result<VoterId, VoteStoreError>> {
        let records =
            self.sorted_matches(|r| r.target == target && direction.is_none_or(|d| r.direction == d));
        stream::iter(records.into_iter().map(|r| Ok(r.voter_id))).boxed()
    }

    fn list_targets(
        &self,
        voter_id: VoterId,
        kind: TargetKind,
        direction: Option<VoteDirection>,
    ) -> BoxStream<'static, Result<TargetRef, VoteStoreError>> {
        let records = self.sorted_matches(|r| {
            r.voter_id == voter_id
                && r.target.kind == kind
                && direction.is_none_or(|d| r.direction == d)
        });
        stream::iter(records.into_iter().map(|r| Ok(r.target))).boxed()
    }

    async fn register(&self, target: TargetRef) -> Result<(), VoteStoreError> {
        let mut state = self.state();
        state.counters.entry(target).or_default();
        Ok(())
    }

    async fn fetch_counts(&self, target: TargetRef) -> Result<Option<VoteCounts>, VoteStoreError> {
        let state = self.state();
        Ok(state.counters.get(&target).copied())
    }

    async fn add_deltas(
        &self,
        target: TargetRef,
        up_delta: i64,
        down_delta: i64,
        new_rate: f64,
    ) -> Result<(), VoteStoreError> {
        let mut state = self.state();
        match state.counters.get_mut(&target) {
            Some(counts) => {
                counts.up_count += up_delta;
                counts.down_count += down_delta;
                counts.upvote_rate = new_rate;
                Ok(())
            }
            None => Err(VoteStoreError::EntityNotFound(target)),
        }
    }

    async fn apply_vote(&self, change: &VoteChange) -> Result<(), VoteStoreError> {
        let mut state = self.state();
        if !state.counters.contains_key(&change.target) {
            return Err(VoteStoreError::EntityNotFound(change.target));
        }
        state.apply_mutation(change.target, change.mutation)?;
        if let Some(counts) = state.counters.get_mut(&change.target) {
            counts.up_count += change.up_delta;
            counts.down_count += change.down_delta;
            counts.upvote_rate = change.new_rate;
        }
        Ok(())
    }

    async fn apply_bulk(&self, change: &BulkChange<'_>) -> Result<(), VoteStoreError> {
        let mut state = self.state();
        if !state.counters.contains_key(&change.target) {
            return Err(VoteStoreError::EntityNotFound(change.target));
        }

        // Validate the insert batch up front so the whole operation stays
        // all-or-nothing without needing a rollback path.
        if let Some((voter_ids, _)) = change.insert {
            let removed: HashSet<VoterId> = change.remove_voter_ids.iter().copied().collect();
            let mut seen = HashSet::new();
            for &voter_id in voter_ids {
                let survives = !removed.contains(&voter_id)
                    && state.has_record(change.target, voter_id);
                if !seen.insert(voter_id) || survives {
                    return Err(VoteStoreError::DuplicateVote {
                        voter_id,
                        target: change.target,
                    });
                }
            }
        }

        let voters: HashSet<VoterId> = change.remove_voter_ids.iter().copied().collect();
        state
            .records
            .retain(|r| !(r.target == change.target && voters.contains(&r.voter_id)));

        if let Some((voter_ids, direction)) = change.insert {
            for &voter_id in voter_ids {
                state.insert_record(change.target, voter_id, direction);
            }
        }

        if let Some(counts) = state.counters.get_mut(&change.target) {
            counts.up_count += change.up_delta;
            counts.down_count += change.down_delta;
            counts.upvote_rate = change.new_rate;
        }
        Ok(())
    }

    async fn popular(&self, filter: &PopularFilter) -> Result<Vec<VoteTotals>, VoteStoreError> {
        let state = self.state();
        let mut totals: Vec<VoteTotals> = state
            .counters
            .iter()
            .filter(|(_, counts)| {
                counts.upvote_rate >= filter.min_rate && counts.up_count >= filter.min_up_count
            })
            .map(|(&target, &counts)| VoteTotals { target, counts })
            .collect();
        totals.sort_by(|a, b| {
            b.counts
                .up_count
                .cmp(&a.counts.up_count)
                .then_with(|| (a.target.kind, a.target.id).cmp(&(b.target.kind, b.target.id)))
        });
        if let Some(limit) = filter.effective_limit() {
            totals.truncate(limit as usize);
        }
        Ok(totals)
    }
}
