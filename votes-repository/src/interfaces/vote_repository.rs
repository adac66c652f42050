//! This module defines the `VoteRepository` trait, which provides an
//! interface for interacting with the underlying data store for vote records
//! and aggregate counters. It abstracts the database operations for
//! persistence and retrieval.
use crate::errors::VoteStoreError;
use futures::stream::BoxStream;
use votes_shared::types::{
    BulkChange, PopularFilter, RecordId, TargetKind, TargetRef, VoteChange, VoteCounts,
    VoteDirection, VoteRecord, VoteTotals, VoterId,
};

/// A trait that defines the interface for interacting with the vote data
/// repository.
///
/// Implementors provide lookups and mutations on individual vote records,
/// relative updates on aggregate counters, and the two composite operations
/// (`apply_vote`, `apply_bulk`) that persist a record mutation together with
/// its counter adjustment as one atomic unit.
#[async_trait::async_trait]
pub trait VoteRepository: Send + Sync {
    /// Looks up the live vote record for a (voter, target) pair.
    ///
    /// # Arguments
    ///
    /// * `voter_id` - The voter whose record to look up.
    /// * `target` - The entity being voted on.
    ///
    /// # Returns
    ///
    /// `Ok(Some(record))` when the voter has a live vote on the target,
    /// `Ok(None)` otherwise, or a `VoteStoreError` if the lookup fails.
    async fn find(
        &self,
        voter_id: VoterId,
        target: TargetRef,
    ) -> Result<Option<VoteRecord>, VoteStoreError>;

    /// Counts the live vote records on a target, optionally filtered by
    /// direction.
    async fn count(
        &self,
        target: TargetRef,
        direction: Option<VoteDirection>,
    ) -> Result<i64, VoteStoreError>;

    /// Counts the live vote records on a target held by voters in
    /// `voter_ids`, optionally filtered by direction.
    ///
    /// This is a single round-trip regardless of the number of voters, which
    /// is what keeps bulk operations bounded.
    async fn count_in(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
        direction: Option<VoteDirection>,
    ) -> Result<i64, VoteStoreError>;

    /// Creates a fresh vote record.
    ///
    /// # Returns
    ///
    /// The stored record including its assigned id and `created_at`, or
    /// `VoteStoreError::DuplicateVote` if the voter already has a live
    /// record on the target.
    async fn create(
        &self,
        target: TargetRef,
        voter_id: VoterId,
        direction: VoteDirection,
    ) -> Result<VoteRecord, VoteStoreError>;

    /// Flips an existing record to the given direction, preserving its
    /// `created_at`.
    async fn update_direction(
        &self,
        record_id: RecordId,
        direction: VoteDirection,
    ) -> Result<(), VoteStoreError>;

    /// Deletes an existing record.
    async fn delete(&self, record_id: RecordId) -> Result<(), VoteStoreError>;

    /// Deletes every record on `target` held by voters in `voter_ids` with a
    /// single bulk delete, returning the number of records removed.
    async fn bulk_delete(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
    ) -> Result<u64, VoteStoreError>;

    /// Inserts one fresh record per voter with a single bulk insert.
    ///
    /// Callers are expected to have removed any existing records for the
    /// listed voters first; `apply_bulk` does both in one transaction.
    async fn bulk_create(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
        direction: VoteDirection,
    ) -> Result<(), VoteStoreError>;

    /// Streams the ids of voters with live records on `target`, optionally
    /// filtered by direction, newest vote first.
    ///
    /// The stream is lazy and unbounded; rows are fetched as the stream is
    /// polled.
    fn list_voters(
        &self,
        target: TargetRef,
        direction: Option<VoteDirection>,
    ) -> BoxStream<'static, Result<VoterId, VoteStoreError>>;

    /// Streams the targets of `kind` that `voter_id` has live records on,
    /// optionally filtered by direction, newest vote first.
    fn list_targets(
        &self,
        voter_id: VoterId,
        kind: TargetKind,
        direction: Option<VoteDirection>,
    ) -> BoxStream<'static, Result<TargetRef, VoteStoreError>>;

    /// Idempotently creates a zeroed counter row for `target`.
    async fn register(&self, target: TargetRef) -> Result<(), VoteStoreError>;

    /// Fetches the aggregate counters for `target`, if it is registered.
    async fn fetch_counts(&self, target: TargetRef) -> Result<Option<VoteCounts>, VoteStoreError>;

    /// Applies a relative update to the stored counters and replaces the
    /// stored rate.
    ///
    /// The deltas are added on the stored integers in a single statement, so
    /// concurrent voters on the same entity cannot lose updates.
    ///
    /// # Returns
    ///
    /// `VoteStoreError::EntityNotFound` if `target` has no counter row.
    async fn add_deltas(
        &self,
        target: TargetRef,
        up_delta: i64,
        down_delta: i64,
        new_rate: f64,
    ) -> Result<(), VoteStoreError>;

    /// Atomically persists a single-vote transition: the record mutation and
    /// the counter adjustment either both commit or neither does.
    async fn apply_vote(&self, change: &VoteChange) -> Result<(), VoteStoreError>;

    /// Atomically persists a bulk transition: one bulk delete, at most one
    /// bulk insert, and one counter update, all in a single transaction.
    async fn apply_bulk(&self, change: &BulkChange<'_>) -> Result<(), VoteStoreError>;

    /// Returns the entities whose counters pass the popularity thresholds,
    /// ordered by `up_count` descending and truncated to the filter's limit.
    async fn popular(&self, filter: &PopularFilter) -> Result<Vec<VoteTotals>, VoteStoreError>;
}
