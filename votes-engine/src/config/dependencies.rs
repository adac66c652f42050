//! Dependency initialization and wiring for the votes engine.
use crate::engine::VoteEngine;
use crate::errors::VoteEngineError;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::sync::Arc;
use tracing::info;
use votes_repository::PostgresVoteRepository;
use votes_repository::postgres::run_migrations;

/// Default maximum number of pooled database connections.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// `Dependencies` holds the wired components of the vote system.
///
/// It is constructed once per process and handed to whatever needs vote
/// operations; the pool is exposed so the surrounding application can share
/// it with its own repositories.
pub struct Dependencies {
    pub engine: VoteEngine,
    pub pool: sqlx::PgPool,
}

impl Dependencies {
    /// Initializes all dependencies from environment variables.
    ///
    /// Loads `.env` if present, connects the PostgreSQL pool, runs the
    /// schema migrations, and wires the repository into a `VoteEngine`.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: PostgreSQL connection string (required)
    /// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 5)
    ///
    /// # Returns
    ///
    /// A `Result` which is `Ok(Self)` on successful initialization or a
    /// `VoteEngineError` if the pool or migrations fail.
    pub async fn new() -> Result<Self, VoteEngineError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        info!(max_connections, "Connecting to the vote store");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(&database_url)
            .await
            .map_err(|e| VoteEngineError::Store(e.into()))?;
        run_migrations(&pool).await?;

        let repository = PostgresVoteRepository::new(pool.clone()).await?;
        let engine = VoteEngine::new(Arc::new(repository));
        info!("Vote engine dependencies initialized");

        Ok(Self { engine, pool })
    }
}
