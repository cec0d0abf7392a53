//! Retry-wrapped store access for the ingestion and trend pipelines.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsflow_core::{Article, DedupScope, NewArticle, TrendMatch};
use serde::Serialize;

mod client;
mod error;
mod memory;
mod postgres;
mod retry;

pub use client::{execute_with_retry, StoreClient, StoreConfig};
pub use error::StoreError;
pub use memory::MemoryArticleStore;
pub use postgres::PgArticleStore;
pub use retry::{classify_sqlx_error, Classify, RetryDisposition, RetryFailure, RetryPolicy};

pub const CRATE_NAME: &str = "newsflow-storage";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    pub archived: u64,
    pub removed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { id: i64 },
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrendWriteReport {
    pub keywords: usize,
    pub related: usize,
}

/// Query contract both pipelines rely on.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Copies active rows dated strictly before `cutoff` into the archive
    /// (upsert by id), then deletes them from the active table.
    async fn rotate_archive(&self, cutoff: DateTime<Utc>) -> Result<RotationReport, StoreError>;

    /// Returns the subset of `hrefs` already stored under `scope`.
    async fn existing_hrefs(
        &self,
        hrefs: &[String],
        scope: DedupScope,
    ) -> Result<HashSet<String>, StoreError>;

    async fn insert_article(
        &self,
        article: &NewArticle,
        inserted_at: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError>;

    /// Active articles, newest first.
    async fn recent_articles(&self, limit: usize) -> Result<Vec<Article>, StoreError>;

    /// Drops every stored trend row and writes `matches` in their place.
    async fn replace_trends(&self, matches: &[TrendMatch]) -> Result<TrendWriteReport, StoreError>;
}
