//! PostgreSQL implementation of the votes repository.
//!
//! Provides a production-ready PostgreSQL backend for the `VoteRepository`
//! trait with connection pooling, transaction safety, and batch operations.
//!
//! ## Key Features
//!
//! - Connection pooling with `sqlx::PgPool`
//! - ACID transactions with automatic rollback
//! - Bulk operations using PostgreSQL's `UNNEST` and `ANY`
//! - Relative counter updates (`up_count = up_count + $n`) so concurrent
//!   voters on one entity never lose updates
//! - Lazy row streams for voter listings
//!
//! ## Database Tables
//!
//! - `vote_records`: individual voting records, one live row per
//!   (voter, target)
//! - `vote_counts`: aggregated tallies and the derived upvote rate per
//!   entity
use crate::errors::VoteStoreError;
use crate::interfaces::VoteRepository;
use crate::postgres::{direction_from_smallint, direction_to_smallint};
use async_trait::async_trait;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use sqlx::Row;
use sqlx::postgres::PgRow;
use votes_shared::types::{
    BulkChange, PopularFilter, RecordId, TargetKind, TargetRef, VoteChange, VoteCounts,
    VoteDirection, VoteMutation, VoteRecord, VoteTotals, VoterId,
};

/// PostgreSQL implementation of the votes repository.
///
/// Provides database operations for vote records and aggregate counters
/// using PostgreSQL with connection pooling and transaction support.
pub struct PostgresVoteRepository {
    pool: sqlx::PgPool,
}

/// Maps a row from `vote_records` into a `VoteRecord`.
fn record_from_row(row: &PgRow) -> Result<VoteRecord, VoteStoreError> {
    let direction = direction_from_smallint(row.try_get::<i16, _>("direction")?)?;
    Ok(VoteRecord {
        id: row.try_get("id")?,
        voter_id: row.try_get("voter_id")?,
        target: TargetRef::new(
            TargetKind::new(row.try_get::<i16, _>("target_kind")?),
            row.try_get("target_id")?,
        ),
        direction,
        created_at: row.try_get("created_at")?,
    })
}

/// Maps a unique-constraint violation on `vote_records` to `DuplicateVote`,
/// passing every other error through as a database error.
fn map_unique_violation(e: sqlx::Error, voter_id: VoterId, target: TargetRef) -> VoteStoreError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            VoteStoreError::DuplicateVote { voter_id, target }
        }
        other => VoteStoreError::Database(other),
    }
}

impl PostgresVoteRepository {
    /// Creates a new PostgreSQL repository instance.
    ///
    /// # Arguments
    ///
    /// * `pool` - Configured PostgreSQL connection pool with the required
    ///   schema (see `run_migrations`)
    ///
    /// # Returns
    ///
    /// * `Ok(PostgresVoteRepository)` - Ready-to-use repository instance
    /// * `Err(VoteStoreError)` - Future validation errors (currently always
    ///   succeeds)
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, VoteStoreError> {
        Ok(Self { pool })
    }

    /// Inserts a fresh vote record within an active transaction.
    ///
    /// Unique-constraint violations on (voter, target) surface as
    /// `DuplicateVote` so the engine can retry with a refreshed read.
    async fn create_tx(
        &self,
        target: TargetRef,
        voter_id: VoterId,
        direction: VoteDirection,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<VoteRecord, VoteStoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO vote_records (voter_id, target_kind, target_id, direction)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
            "#,
        )
        .bind(voter_id)
        .bind(target.kind.tag())
        .bind(target.id)
        .bind(direction_to_smallint(direction))
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_unique_violation(e, voter_id, target))?;

        Ok(VoteRecord {
            id: row.try_get("id")?,
            voter_id,
            target,
            direction,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Flips an existing record's direction within an active transaction.
    /// `created_at` is deliberately left untouched.
    async fn set_direction_tx(
        &self,
        record_id: RecordId,
        direction: VoteDirection,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<(), VoteStoreError> {
        let result = sqlx::query("UPDATE vote_records SET direction = $2 WHERE id = $1")
            .bind(record_id)
            .bind(direction_to_smallint(direction))
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(VoteStoreError::RecordNotFound(record_id));
        }
        Ok(())
    }

    /// Deletes an existing record within an active transaction.
    async fn delete_tx(
        &self,
        record_id: RecordId,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<(), VoteStoreError> {
        let result = sqlx::query("DELETE FROM vote_records WHERE id = $1")
            .bind(record_id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(VoteStoreError::RecordNotFound(record_id));
        }
        Ok(())
    }

    /// Deletes every record on `target` held by the listed voters with a
    /// single statement, returning the number of rows removed.
    async fn bulk_delete_tx(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<u64, VoteStoreError> {
        if voter_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM vote_records WHERE target_kind = $1 AND target_id = $2 AND voter_id = ANY($3)",
        )
        .bind(target.kind.tag())
        .bind(target.id)
        .bind(voter_ids.to_vec())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Inserts one fresh record per listed voter with a single `UNNEST`
    /// insert within an active transaction.
    async fn bulk_insert_tx(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
        direction: VoteDirection,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<(), VoteStoreError> {
        if voter_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO vote_records (voter_id, target_kind, target_id, direction)
            SELECT v, $2::smallint, $3::bigint, $4::smallint
            FROM UNNEST($1::bigint[]) AS v
            "#,
        )
        .bind(voter_ids.to_vec())
        .bind(target.kind.tag())
        .bind(target.id)
        .bind(direction_to_smallint(direction))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Applies a relative counter update within an active transaction.
    ///
    /// The deltas are added on the stored integers in one statement; a
    /// missing counter row surfaces as `EntityNotFound` and rolls the
    /// transaction back.
    async fn add_deltas_tx(
        &self,
        target: TargetRef,
        up_delta: i64,
        down_delta: i64,
        new_rate: f64,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<(), VoteStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE vote_counts
            SET up_count = up_count + $3,
                down_count = down_count + $4,
                upvote_rate = $5
            WHERE target_kind = $1 AND target_id = $2
            "#,
        )
        .bind(target.kind.tag())
        .bind(target.id)
        .bind(up_delta)
        .bind(down_delta)
        .bind(new_rate)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(VoteStoreError::EntityNotFound(target));
        }
        Ok(())
    }
}

#[async_trait]
impl VoteRepository for PostgresVoteRepository {
    /// Looks up the live vote record for a (voter, target) pair.
    async fn find(
        &self,
        voter_id: VoterId,
        target: TargetRef,
    ) -> Result<Option<VoteRecord>, VoteStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, voter_id, target_kind, target_id, direction, created_at
            FROM vote_records
            WHERE voter_id = $1 AND target_kind = $2 AND target_id = $3
            "#,
        )
        .bind(voter_id)
        .bind(target.kind.tag())
        .bind(target.id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Counts live records on a target, optionally filtered by direction.
    async fn count(
        &self,
        target: TargetRef,
        direction: Option<VoteDirection>,
    ) -> Result<i64, VoteStoreError> {
        let count = match direction {
            Some(d) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM vote_records WHERE target_kind = $1 AND target_id = $2 AND direction = $3",
                )
                .bind(target.kind.tag())
                .bind(target.id)
                .bind(direction_to_smallint(d))
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM vote_records WHERE target_kind = $1 AND target_id = $2",
                )
                .bind(target.kind.tag())
                .bind(target.id)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count)
    }

    /// Counts live records on a target held by the listed voters in a single
    /// round-trip.
    async fn count_in(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
        direction: Option<VoteDirection>,
    ) -> Result<i64, VoteStoreError> {
        if voter_ids.is_empty() {
            return Ok(0);
        }
        let count = match direction {
            Some(d) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM vote_records WHERE target_kind = $1 AND target_id = $2 AND voter_id = ANY($3) AND direction = $4",
                )
                .bind(target.kind.tag())
                .bind(target.id)
                .bind(voter_ids.to_vec())
                .bind(direction_to_smallint(d))
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM vote_records WHERE target_kind = $1 AND target_id = $2 AND voter_id = ANY($3)",
                )
                .bind(target.kind.tag())
                .bind(target.id)
                .bind(voter_ids.to_vec())
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count)
    }

    /// Creates a fresh vote record in its own transaction.
    async fn create(
        &self,
        target: TargetRef,
        voter_id: VoterId,
        direction: VoteDirection,
    ) -> Result<VoteRecord, VoteStoreError> {
        let mut tx = self.pool.begin().await.map_err(VoteStoreError::Database)?;
        let record = self.create_tx(target, voter_id, direction, &mut tx).await?;
        tx.commit().await.map_err(VoteStoreError::Database)?;
        Ok(record)
    }

    /// Flips an existing record's direction in its own transaction.
    async fn update_direction(
        &self,
        record_id: RecordId,
        direction: VoteDirection,
    ) -> Result<(), VoteStoreError> {
        let mut tx = self.pool.begin().await.map_err(VoteStoreError::Database)?;
        self.set_direction_tx(record_id, direction, &mut tx).await?;
        tx.commit().await.map_err(VoteStoreError::Database)?;
        Ok(())
    }

    /// Deletes an existing record in its own transaction.
    async fn delete(&self, record_id: RecordId) -> Result<(), VoteStoreError> {
        let mut tx = self.pool.begin().await.map_err(VoteStoreError::Database)?;
        self.delete_tx(record_id, &mut tx).await?;
        tx.commit().await.map_err(VoteStoreError::Database)?;
        Ok(())
    }

    /// Bulk-deletes the listed voters' records in its own transaction.
    async fn bulk_delete(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
    ) -> Result<u64, VoteStoreError> {
        let mut tx = self.pool.begin().await.map_err(VoteStoreError::Database)?;
        let removed = self.bulk_delete_tx(target, voter_ids, &mut tx).await?;
        tx.commit().await.map_err(VoteStoreError::Database)?;
        Ok(removed)
    }

    /// Bulk-inserts fresh records in its own transaction.
    async fn bulk_create(
        &self,
        target: TargetRef,
        voter_ids: &[VoterId],
        direction: VoteDirection,
    ) -> Result<(), VoteStoreError> {
        let mut tx = self.pool.begin().await.map_err(VoteStoreError::Database)?;
        self.bulk_insert_tx(target, voter_ids, direction, &mut tx)
            .await?;
        tx.commit().await.map_err(VoteStoreError::Database)?;
        Ok(())
    }

    /// Streams voter ids with live records on `target`, newest vote first.
    ///
    /// Rows are fetched lazily as the stream is polled, so arbitrarily large
    /// voter sets never have to be materialized at once.
    fn list_voters(
        &self,
        target: TargetRef,
        direction: Option<VoteDirection>,
    ) -> BoxStream<'static, Result<VoterId, VoteStoreError>> {
        let pool = self.pool.clone();
        Box::pin(async_stream::try_stream! {
            let mut rows = match direction {
                Some(d) => sqlx::query_scalar::<_, i64>(
                    "SELECT voter_id FROM vote_records WHERE target_kind = $1 AND target_id = $2 AND direction = $3 ORDER BY created_at DESC, id DESC",
                )
                .bind(target.kind.tag())
                .bind(target.id)
                .bind(direction_to_smallint(d))
                .fetch(&pool),
                None => sqlx::query_scalar::<_, i64>(
                    "SELECT voter_id FROM vote_records WHERE target_kind = $1 AND target_id = $2 ORDER BY created_at DESC, id DESC",
                )
                .bind(target.kind.tag())
                .bind(target.id)
                .fetch(&pool),
            };
            while let Some(voter_id) = rows.try_next().await? {
                yield voter_id;
            }
        })
    }

    /// Streams the targets of `kind` that a voter has live records on,
    /// newest vote first.
    fn list_targets(
        &self,
        voter_id: VoterId,
        kind: TargetKind,
        direction: Option<VoteDirection>,
    ) -> BoxStream<'static, Result<TargetRef, VoteStoreError>> {
        let pool = self.pool.clone();
        Box::pin(async_stream::try_stream! {
            let mut rows = match direction {
                Some(d) => sqlx::query_scalar::<_, i64>(
                    "SELECT target_id FROM vote_records WHERE voter_id = $1 AND target_kind = $2 AND direction = $3 ORDER BY created_at DESC, id DESC",
                )
                .bind(voter_id)
                .bind(kind.tag())
                .bind(direction_to_smallint(d))
                .fetch(&pool),
                None => sqlx::query_scalar::<_, i64>(
                    "SELECT target_id FROM vote_records WHERE voter_id = $1 AND target_kind = $2 ORDER BY created_at DESC, id DESC",
                )
                .bind(voter_id)
                .bind(kind.tag())
                .fetch(&pool),
            };
            while let Some(target_id) = rows.try_next().await? {
                yield TargetRef::new(kind, target_id);
            }
        })
    }

    /// Idempotently creates a zeroed counter row for `target`.
    async fn register(&self, target: TargetRef) -> Result<(), VoteStoreError> {
        sqlx::query(
            r#"
            INSERT INTO vote_counts (target_kind, target_id)
            VALUES ($1, $2)
            ON CONFLICT (target_kind, target_id) DO NOTHING
            "#,
        )
        .bind(target.kind.tag())
        .bind(target.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetches the aggregate counters for `target`, if registered.
    async fn fetch_counts(&self, target: TargetRef) -> Result<Option<VoteCounts>, VoteStoreError> {
        let row = sqlx::query(
            "SELECT up_count, down_count, upvote_rate FROM vote_counts WHERE target_kind = $1 AND target_id = $2",
        )
        .bind(target.kind.tag())
        .bind(target.id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(VoteCounts {
                up_count: row.try_get("up_count")?,
                down_count: row.try_get("down_count")?,
                upvote_rate: row.try_get("upvote_rate")?,
            })),
            None => Ok(None),
        }
    }

    /// Applies a relative counter update in its own transaction.
    async fn add_deltas(
        &self,
        target: TargetRef,
        up_delta: i64,
        down_delta: i64,
        new_rate: f64,
    ) -> Result<(), VoteStoreError> {
        let mut tx = self.pool.begin().await.map_err(VoteStoreError::Database)?;
        self.add_deltas_tx(target, up_delta, down_delta, new_rate, &mut tx)
            .await?;
        tx.commit().await.map_err(VoteStoreError::Database)?;
        Ok(())
    }

    /// Atomically persists a single-vote transition.
    ///
    /// The record mutation and the counter adjustment run in one
    /// transaction; any failure rolls both back, so the counters never
    /// drift from the record set.
    async fn apply_vote(&self, change: &VoteChange) -> Result<(), VoteStoreError> {
        let mut tx = self.pool.begin().await.map_err(VoteStoreError::Database)?;
        match change.mutation {
            VoteMutation::Create {
                voter_id,
                direction,
            } => {
                self.create_tx(change.target, voter_id, direction, &mut tx)
                    .await?;
            }
            VoteMutation::SetDirection {
                record_id,
                direction,
            } => {
                self.set_direction_tx(record_id, direction, &mut tx).await?;
            }
            VoteMutation::Delete { record_id } => {
                self.delete_tx(record_id, &mut tx).await?;
            }
        }
        self.add_deltas_tx(
            change.target,
            change.up_delta,
            change.down_delta,
            change.new_rate,
            &mut tx,
        )
        .await?;
        tx.commit().await.map_err(VoteStoreError::Database)?;
        Ok(())
    }

    /// Atomically persists a bulk transition.
    ///
    /// One bulk delete, at most one bulk insert, and one counter update,
    /// committed together. Round-trips stay bounded no matter how many
    /// voters the batch names.
    async fn apply_bulk(&self, change: &BulkChange<'_>) -> Result<(), VoteStoreError> {
        let mut tx = self.pool.begin().await.map_err(VoteStoreError::Database)?;
        self.bulk_delete_tx(change.target, change.remove_voter_ids, &mut tx)
            .await?;
        if let Some((voter_ids, direction)) = change.insert {
            self.bulk_insert_tx(change.target, voter_ids, direction, &mut tx)
                .await?;
        }
        self.add_deltas_tx(
            change.target,
            change.up_delta,
            change.down_delta,
            change.new_rate,
            &mut tx,
        )
        .await?;
        tx.commit().await.map_err(VoteStoreError::Database)?;
        Ok(())
    }

    /// Returns the entities passing the popularity thresholds, ordered by
    /// `up_count` descending.
    async fn popular(&self, filter: &PopularFilter) -> Result<Vec<VoteTotals>, VoteStoreError> {
        let mut query: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "SELECT target_kind, target_id, up_count, down_count, upvote_rate FROM vote_counts WHERE upvote_rate >= ",
        );
        query.push_bind(filter.min_rate);
        query.push(" AND up_count >= ");
        query.push_bind(filter.min_up_count);
        query.push(" ORDER BY up_count DESC");
        if let Some(limit) = filter.effective_limit() {
            query.push(" LIMIT ");
            query.push_bind(i64::from(limit));
        }

        let rows = query.build().fetch_all(&self.pool).await?;

        let mut totals = Vec::with_capacity(rows.len());
        for row in rows {
            totals.push(VoteTotals {
                target: TargetRef::new(
                    TargetKind::new(row.try_get::<i16, _>("target_kind")?),
                    row.try_get("target_id")?,
                ),
                counts: VoteCounts {
                    up_count: row.try_get("up_count")?,
                    down_count: row.try_get("down_count")?,
                    upvote_rate: row.try_get("upvote_rate")?,
                },
            });
        }
        Ok(totals)
    }
}
