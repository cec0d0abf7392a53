use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::error::StoreError;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub retry: RetryPolicy,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Runs a sqlx operation under `policy`, mapping the outcome onto [`StoreError`].
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    policy
        .run(operation, op)
        .await
        .map_err(|failure| StoreError::from_retry(operation, failure))
}

/// The process-wide access point to Postgres. Opened once at startup, shared by
/// both pipelines, closed at shutdown. Callers beyond `max_connections` queue
/// on the pool until a connection is released.
#[derive(Debug, Clone)]
pub struct StoreClient {
    pool: PgPool,
    retry: RetryPolicy,
}

impl StoreClient {
    #[instrument(skip_all, fields(max_connections = config.max_connections))]
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.acquire_timeout);
        let url = config.database_url.as_str();
        let pool = execute_with_retry(&config.retry, "connect", || {
            options.clone().connect(url)
        })
        .await?;
        info!("store pool opened");
        Ok(Self::from_pool(pool, config.retry))
    }

    pub fn from_pool(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Executes `op` against the pool, retrying transient connection failures.
    pub async fn execute<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut(PgPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let pool = &self.pool;
        execute_with_retry(&self.retry, operation, || op(pool.clone())).await
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("store pool closed");
    }
}
