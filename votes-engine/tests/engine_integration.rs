//! Integration tests for the vote engine against the in-memory repository.
//!
//! Each test drives full operation sequences through `VoteEngine` and then
//! verifies that the aggregate counters stay exactly consistent with the
//! underlying vote records, that the derived rate matches the counters, and
//! that the documented return values hold.

use futures::TryStreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use votes_engine::rate::upvote_rate;
use votes_engine::{Votable, VotableEntity, VoteEngine, VoteEngineError};
use votes_repository::{MemoryVoteRepository, VoteRepository, VoteStoreError};
use votes_shared::types::{
    BulkChange, PopularFilter, RecordId, TargetKind, TargetRef, VoteChange, VoteCounts,
    VoteDirection, VoteRecord, VoteTotals, VoterId,
};

const POST: TargetKind = TargetKind::new(1);

fn post(id: i64) -> TargetRef {
    TargetRef::new(POST, id)
}

async fn setup() -> (VoteEngine, Arc<MemoryVoteRepository>, Votable) {
    let repository = Arc::new(MemoryVoteRepository::new());
    let engine = VoteEngine::new(repository.clone());
    let entity = Votable::new(post(1));
    engine.track(&entity).await.unwrap();
    (engine, repository, entity)
}

/// Asserts that the entity's in-memory counters match the live records, the
/// stored counters, and the derived rate.
async fn assert_consistent(repository: &MemoryVoteRepository, entity: &Votable) {
    let target = entity.vote_target();
    let up = repository
        .count(target, Some(VoteDirection::Up))
        .await
        .unwrap();
    let down = repository
        .count(target, Some(VoteDirection::Down))
        .await
        .unwrap();

    let counts = entity.vote_counts();
    assert_eq!(counts.up_count, up, "up_count must equal live up records");
    assert_eq!(
        counts.down_count, down,
        "down_count must equal live down records"
    );
    assert_eq!(counts.upvote_rate, upvote_rate(up, down));

    let stored = repository.fetch_counts(target).await.unwrap().unwrap();
    assert_eq!(*counts, stored, "in-memory counters must mirror the store");
}

// ============================================================================
// Single-vote operations
// ============================================================================

#[tokio::test]
async fn test_first_upvote_is_applied() {
    let (engine, repository, mut entity) = setup().await;

    assert!(engine.upvote(&mut entity, 7).await.unwrap());

    assert_eq!(entity.vote_counts().up_count, 1);
    assert_eq!(entity.vote_counts().down_count, 0);
    assert_eq!(entity.vote_counts().upvote_rate, 1.0);
    assert!(engine.is_upvoted_by(&entity, 7).await.unwrap());
    assert_consistent(&repository, &entity).await;
}

#[tokio::test]
async fn test_repeated_upvote_is_a_noop() {
    let (engine, repository, mut entity) = setup().await;

    assert!(engine.upvote(&mut entity, 7).await.unwrap());
    let after_first = *entity.vote_counts();

    assert!(!engine.upvote(&mut entity, 7).await.unwrap());
    assert_eq!(*entity.vote_counts(), after_first);
    assert_eq!(repository.count(entity.vote_target(), None).await.unwrap(), 1);
    assert_consistent(&repository, &entity).await;
}

#[tokio::test]
async fn test_flip_moves_one_vote_between_counters() {
    let (engine, repository, mut entity) = setup().await;

    engine.upvote(&mut entity, 7).await.unwrap();
    let after_upvote = *entity.vote_counts();

    assert!(engine.downvote(&mut entity, 7).await.unwrap());

    assert_eq!(entity.vote_counts().up_count, after_upvote.up_count - 1);
    assert_eq!(entity.vote_counts().down_count, after_upvote.down_count + 1);
    // Net effect versus before either call: up +0, down +1.
    assert_eq!(entity.vote_counts().up_count, 0);
    assert_eq!(entity.vote_counts().down_count, 1);
    assert!(engine.is_downvoted_by(&entity, 7).await.unwrap());
    assert!(!engine.is_upvoted_by(&entity, 7).await.unwrap());
    assert_consistent(&repository, &entity).await;
}

#[tokio::test]
async fn test_flip_preserves_the_existing_record() {
    let (engine, repository, mut entity) = setup().await;

    engine.upvote(&mut entity, 7).await.unwrap();
    let original = repository.find(7, entity.vote_target()).await.unwrap().unwrap();

    engine.downvote(&mut entity, 7).await.unwrap();
    let flipped = repository.find(7, entity.vote_target()).await.unwrap().unwrap();

    assert_eq!(flipped.id, original.id);
    assert_eq!(flipped.created_at, original.created_at);
    assert_eq!(flipped.direction, VoteDirection::Down);
}

#[tokio::test]
async fn test_retract_restores_previous_counters() {
    let (engine, repository, mut entity) = setup().await;

    engine.upvote(&mut entity, 1).await.unwrap();
    engine.downvote(&mut entity, 2).await.unwrap();
    let before = *entity.vote_counts();

    engine.upvote(&mut entity, 7).await.unwrap();
    assert!(engine.retract(&mut entity, 7).await.unwrap());

    assert_eq!(*entity.vote_counts(), before);
    assert!(!engine.is_upvoted_by(&entity, 7).await.unwrap());
    assert!(!engine.has_voted_by(&entity, 7).await.unwrap());
    assert_consistent(&repository, &entity).await;
}

#[tokio::test]
async fn test_retract_without_a_vote_is_a_noop() {
    let (engine, repository, mut entity) = setup().await;

    assert!(!engine.retract(&mut entity, 7).await.unwrap());
    assert_eq!(*entity.vote_counts(), VoteCounts::default());
    assert_consistent(&repository, &entity).await;
}

#[tokio::test]
async fn test_revote_after_retract_creates_a_fresh_record() {
    let (engine, repository, mut entity) = setup().await;

    engine.upvote(&mut entity, 7).await.unwrap();
    let first = repository.find(7, entity.vote_target()).await.unwrap().unwrap();

    engine.retract(&mut entity, 7).await.unwrap();
    engine.upvote(&mut entity, 7).await.unwrap();
    let second = repository.find(7, entity.vote_target()).await.unwrap().unwrap();

    assert_ne!(second.id, first.id);
    assert_consistent(&repository, &entity).await;
}

#[tokio::test]
async fn test_vote_on_untracked_entity_surfaces_not_found() {
    let repository = Arc::new(MemoryVoteRepository::new());
    let engine = VoteEngine::new(repository.clone());
    let mut entity = Votable::new(post(99));

    let err = engine.upvote(&mut entity, 7).await.unwrap_err();
    assert!(matches!(
        err,
        VoteEngineError::Store(VoteStoreError::EntityNotFound(_))
    ));
    // Nothing leaked into the record store.
    assert_eq!(repository.count(post(99), None).await.unwrap(), 0);
    assert_eq!(*entity.vote_counts(), VoteCounts::default());
}

#[tokio::test]
async fn test_zero_votes_has_zero_rate() {
    let (engine, repository, mut entity) = setup().await;

    engine.upvote(&mut entity, 7).await.unwrap();
    engine.retract(&mut entity, 7).await.unwrap();

    assert_eq!(entity.vote_counts().upvote_rate, 0.0);
    assert_consistent(&repository, &entity).await;
}

// ============================================================================
// Bulk operations
// ============================================================================

#[tokio::test]
async fn test_bulk_set_applies_the_net_counter_change() {
    let (engine, repository, mut entity) = setup().await;

    // Seed: up_count = 5, down_count = 2.
    for voter_id in [101, 102, 103, 104, 105] {
        engine.upvote(&mut entity, voter_id).await.unwrap();
    }
    for voter_id in [201, 202] {
        engine.downvote(&mut entity, voter_id).await.unwrap();
    }

    // Batch of 10: three already upvoted, two downvoted, five fresh.
    let batch = [101, 102, 103, 201, 202, 301, 302, 303, 304, 305];
    let written = engine
        .bulk_set(&mut entity, &batch, VoteDirection::Up)
        .await
        .unwrap();

    assert_eq!(written, 10);
    assert_eq!(entity.vote_counts().up_count, 12); // 5 + 10 - 3
    assert_eq!(entity.vote_counts().down_count, 0); // 2 - 2
    assert_eq!(entity.vote_counts().upvote_rate, 1.0);

    // Exactly one record per batch voter, all upvotes.
    for voter_id in batch {
        let record = repository
            .find(voter_id, entity.vote_target())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.direction, VoteDirection::Up);
    }
    assert_eq!(repository.count(entity.vote_target(), None).await.unwrap(), 12);
    assert_consistent(&repository, &entity).await;
}

#[tokio::test]
async fn test_bulk_set_replaces_records_for_the_whole_batch() {
    let (engine, repository, mut entity) = setup().await;

    engine.upvote(&mut entity, 1).await.unwrap();
    let first = repository.find(1, entity.vote_target()).await.unwrap().unwrap();

    engine
        .bulk_set(&mut entity, &[1, 2], VoteDirection::Up)
        .await
        .unwrap();

    // Even an already-matching vote is rewritten as a fresh record.
    let replaced = repository.find(1, entity.vote_target()).await.unwrap().unwrap();
    assert_ne!(replaced.id, first.id);
    assert_eq!(entity.vote_counts().up_count, 2);
    assert_consistent(&repository, &entity).await;
}

#[tokio::test]
async fn test_bulk_set_counts_duplicate_voters_once() {
    let (engine, repository, mut entity) = setup().await;

    let written = engine
        .bulk_set(&mut entity, &[7, 7, 8], VoteDirection::Down)
        .await
        .unwrap();

    assert_eq!(written, 2);
    assert_eq!(entity.vote_counts().down_count, 2);
    assert_consistent(&repository, &entity).await;
}

#[tokio::test]
async fn test_bulk_retract_removes_votes_in_both_directions() {
    let (engine, repository, mut entity) = setup().await;

    for voter_id in [1, 2, 3] {
        engine.upvote(&mut entity, voter_id).await.unwrap();
    }
    for voter_id in [4, 5] {
        engine.downvote(&mut entity, voter_id).await.unwrap();
    }

    let removed = engine
        .bulk_retract(&mut entity, &[1, 2, 4, 9])
        .await
        .unwrap();

    assert_eq!(removed, 3);
    assert_eq!(entity.vote_counts().up_count, 1);
    assert_eq!(entity.vote_counts().down_count, 1);
    assert_consistent(&repository, &entity).await;
}

#[tokio::test]
async fn test_empty_bulk_operations_are_noops() {
    let (engine, repository, mut entity) = setup().await;
    engine.upvote(&mut entity, 7).await.unwrap();
    let before = *entity.vote_counts();

    assert_eq!(
        engine
            .bulk_set(&mut entity, &[], VoteDirection::Up)
            .await
            .unwrap(),
        0
    );
    assert_eq!(engine.bulk_retract(&mut entity, &[]).await.unwrap(), 0);
    assert_eq!(*entity.vote_counts(), before);
    assert_consistent(&repository, &entity).await;
}

// ============================================================================
// Voter listings
// ============================================================================

#[tokio::test]
async fn test_voters_stream_filters_by_direction_newest_first() {
    let (engine, _repository, mut entity) = setup().await;

    engine.upvote(&mut entity, 1).await.unwrap();
    engine.upvote(&mut entity, 2).await.unwrap();
    engine.downvote(&mut entity, 3).await.unwrap();

    let upvoters: Vec<VoterId> = engine
        .voters(&entity, Some(VoteDirection::Up))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(upvoters, vec![2, 1]);

    let everyone: Vec<VoterId> = engine.voters(&entity, None).try_collect().await.unwrap();
    assert_eq!(everyone, vec![3, 2, 1]);
}

#[tokio::test]
async fn test_voted_targets_lists_a_voters_entities() {
    let repository = Arc::new(MemoryVoteRepository::new());
    let engine = VoteEngine::new(repository.clone());
    let mut first = Votable::new(post(1));
    let mut second = Votable::new(post(2));
    engine.track(&first).await.unwrap();
    engine.track(&second).await.unwrap();

    engine.upvote(&mut first, 7).await.unwrap();
    engine.downvote(&mut second, 7).await.unwrap();

    let all: Vec<TargetRef> = engine
        .voted_targets(7, POST, None)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(all, vec![post(2), post(1)]);

    let upvoted: Vec<TargetRef> = engine
        .voted_targets(7, POST, Some(VoteDirection::Up))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(upvoted, vec![post(1)]);
}

// ============================================================================
// Popularity query
// ============================================================================

#[tokio::test]
async fn test_popular_applies_both_thresholds() {
    let repository = Arc::new(MemoryVoteRepository::new());
    let engine = VoteEngine::new(repository.clone());

    let mut liked = Votable::new(post(1));
    let mut almost = Votable::new(post(2));
    engine.track(&liked).await.unwrap();
    engine.track(&almost).await.unwrap();

    let ten: Vec<VoterId> = (1..=10).collect();
    engine
        .bulk_set(&mut liked, &ten, VoteDirection::Up)
        .await
        .unwrap();
    let nine: Vec<VoterId> = (1..=9).collect();
    engine
        .bulk_set(&mut almost, &nine, VoteDirection::Up)
        .await
        .unwrap();

    let totals = engine.popular(&PopularFilter::default()).await.unwrap();
    let targets: Vec<TargetRef> = totals.iter().map(|t| t.target).collect();
    assert_eq!(targets, vec![post(1)]);
    assert_eq!(totals[0].counts.up_count, 10);
    assert_eq!(totals[0].counts.upvote_rate, 1.0);
}

#[tokio::test]
async fn test_popular_orders_by_up_count_and_truncates() {
    let repository = Arc::new(MemoryVoteRepository::new());
    let engine = VoteEngine::new(repository.clone());

    for (id, votes) in [(1, 10), (2, 30), (3, 20)] {
        let mut entity = Votable::new(post(id));
        engine.track(&entity).await.unwrap();
        let batch: Vec<VoterId> = (1..=votes).collect();
        engine
            .bulk_set(&mut entity, &batch, VoteDirection::Up)
            .await
            .unwrap();
    }

    let totals = engine.popular(&PopularFilter::default()).await.unwrap();
    let ids: Vec<i64> = totals.iter().map(|t| t.target.id).collect();
    assert_eq!(ids, vec![2, 3, 1]);

    let limited = engine
        .popular(&PopularFilter {
            limit: Some(2),
            ..PopularFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

// ============================================================================
// Concurrent-vote conflict handling
// ============================================================================

/// Repository wrapper that serves a configurable number of stale `find`
/// reads, reproducing the window where another request creates the record
/// between this request's lookup and its write.
struct RacingRepository {
    inner: MemoryVoteRepository,
    stale_finds: AtomicUsize,
}

impl RacingRepository {
    fn new(inner: MemoryVoteRepository, stale_finds: usize) -> Self {
        Self {
            inner,
            stale_finds: AtomicUsize::new(stale_finds),
        }
    }
}

#[async_trait::async_trait]
impl VoteRepository for RacingRepository {
    async fn find(
        &self,
        voter_id: VoterId,
        target: TargetRef,
    ) -> Result<Option<VoteRecord>, VoteStoreError> {
        if self.stale_finds.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(None);
        }
        self.inner.find(voter_id, target).await
    }

    async fn count(
        &self,
        target: TargetRef,
        direction: Option<VoteDirection>,
    ) -> Result<i64, VoteStoreError> {
        self.inner.count(target, direction).await
    }

    async fn count_in(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
        direction: Option<VoteDirection>,
    ) -> Result<i64, VoteStoreError> {
        self.inner.count_in(target, voter_ids, direction).await
    }

    async fn create(
        &self,
        target: TargetRef,
        voter_id: VoterId,
        direction: VoteDirection,
    ) -> Result<VoteRecord, VoteStoreError> {
        self.inner.create(target, voter_id, direction).await
    }

    async fn update_direction(
        &self,
        record_id: RecordId,
        direction: VoteDirection,
    ) -> Result<(), VoteStoreError> {
        self.inner.update_direction(record_id, direction).await
    }

    async fn delete(&self, record_id: RecordId) -> Result<(), VoteStoreError> {
        self.inner.delete(record_id).await
    }

    async fn bulk_delete(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
    ) -> Result<u64, VoteStoreError> {
        self.inner.bulk_delete(target, voter_ids).await
    }

    async fn bulk_create(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
        direction: VoteDirection,
    ) -> Result<(), VoteStoreError> {
        self.inner.bulk_create(target, voter_ids, direction).await
    }

    fn list_voters(
        &self,
        target: TargetRef,
        direction: Option<VoteDirection>,
    ) -> BoxStream<'static, Result<VoterId, VoteStoreError>> {
        self.inner.list_voters(target, direction)
    }

    fn list_targets(
        &self,
        voter_id: VoterId,
        kind: TargetKind,
        direction: Option<VoteDirection>,
    ) -> BoxStream<'static, Result<TargetRef, VoteStoreError>> {
        self.inner.list_targets(voter_id, kind, direction)
    }

    async fn register(&self, target: TargetRef) -> Result<(), VoteStoreError> {
        self.inner.register(target).await
    }

    async fn fetch_counts(&self, target: TargetRef) -> Result<Option<VoteCounts>, VoteStoreError> {
        self.inner.fetch_counts(target).await
    }

    async fn add_deltas(
        &self,
        target: TargetRef,
        up_delta: i64,
        down_delta: i64,
        new_rate: f64,
    ) -> Result<(), VoteStoreError> {
        self.inner.add_deltas(target, up_delta, down_delta, new_rate).await
    }

    async fn apply_vote(&self, change: &VoteChange) -> Result<(), VoteStoreError> {
        self.inner.apply_vote(change).await
    }

    async fn apply_bulk(&self, change: &BulkChange<'_>) -> Result<(), VoteStoreError> {
        self.inner.apply_bulk(change).await
    }

    async fn popular(&self, filter: &PopularFilter) -> Result<Vec<VoteTotals>, VoteStoreError> {
        self.inner.popular(filter).await
    }
}

#[tokio::test]
async fn test_lost_race_is_retried_with_a_refreshed_read() {
    // Another request already created an upvote for voter 7; our first read
    // misses it, the create trips the unique constraint, and the retry sees
    // the record and flips it.
    let inner = MemoryVoteRepository::new();
    inner.register(post(1)).await.unwrap();
    inner.create(post(1), 7, VoteDirection::Up).await.unwrap();
    inner.add_deltas(post(1), 1, 0, 1.0).await.unwrap();

    let repository = Arc::new(RacingRepository::new(inner, 1));
    let engine = VoteEngine::new(repository.clone());
    let counts = repository.fetch_counts(post(1)).await.unwrap().unwrap();
    let mut entity = Votable::with_counts(post(1), counts);

    let applied = engine.downvote(&mut entity, 7).await.unwrap();

    assert!(applied);
    assert_eq!(entity.vote_counts().up_count, 0);
    assert_eq!(entity.vote_counts().down_count, 1);
    assert_eq!(
        repository.count(post(1), None).await.unwrap(),
        1,
        "the race must never produce a second record"
    );
}

#[tokio::test]
async fn test_conflict_is_retried_only_once() {
    // Two stale reads in a row: the retry also loses, and the error
    // surfaces instead of looping.
    let inner = MemoryVoteRepository::new();
    inner.register(post(1)).await.unwrap();
    inner.create(post(1), 7, VoteDirection::Up).await.unwrap();
    inner.add_deltas(post(1), 1, 0, 1.0).await.unwrap();

    let repository = Arc::new(RacingRepository::new(inner, 2));
    let engine = VoteEngine::new(repository.clone());
    let mut entity = Votable::with_counts(
        post(1),
        repository.fetch_counts(post(1)).await.unwrap().unwrap(),
    );

    let err = engine.downvote(&mut entity, 7).await.unwrap_err();
    assert!(matches!(
        err,
        VoteEngineError::Store(VoteStoreError::DuplicateVote { .. })
    ));
    assert_eq!(repository.count(post(1), None).await.unwrap(), 1);
}
