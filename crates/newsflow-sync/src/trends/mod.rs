//! Trend correlation: trending keywords matched against the article corpus,
//! with the stored correlations replaced wholesale on every run.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use newsflow_storage::{ArticleStore, TrendWriteReport};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

mod matcher;
mod sources;

pub use matcher::{
    is_noise_keyword, significant_words, MatchMode, MatchPolicy, MatchStrategy, OrderedInSentence,
    PreparedArticle, TrendMatcher, UnorderedTokens, STOP_WORDS,
};
pub use sources::{
    CorpusSource, HttpCorpusSource, PageTrendingSource, StaticTrendingSource, StoreCorpusSource,
    TrendingSource,
};

#[derive(Debug, Clone, Serialize)]
pub struct TrendRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub policy: MatchPolicy,
    pub mode: MatchMode,
    pub keywords_fetched: usize,
    pub corpus_size: usize,
    pub written: TrendWriteReport,
    pub keywords: Vec<String>,
}

pub struct TrendPipeline {
    trending: Arc<dyn TrendingSource>,
    corpus: Arc<dyn CorpusSource>,
    store: Arc<dyn ArticleStore>,
    matcher: TrendMatcher,
}

impl TrendPipeline {
    pub fn new(
        trending: Arc<dyn TrendingSource>,
        corpus: Arc<dyn CorpusSource>,
        store: Arc<dyn ArticleStore>,
        matcher: TrendMatcher,
    ) -> Self {
        Self {
            trending,
            corpus,
            store,
            matcher,
        }
    }

    /// Both inputs are fetched before the store is touched, so a failing
    /// source leaves the previous correlations in place.
    pub async fn run_once(&self) -> Result<TrendRunSummary> {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id)
            .instrument(info_span!("trend_run", %run_id))
            .await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<TrendRunSummary> {
        let started_at = Utc::now();
        let keywords = self
            .trending
            .keywords()
            .await
            .context("fetching trending keywords")?;
        let corpus = self.corpus.articles().await.context("fetching article corpus")?;

        let matches = self.matcher.correlate(&keywords, &corpus);
        let written = self
            .store
            .replace_trends(&matches)
            .await
            .context("replacing stored trend correlations")?;

        info!(
            keywords = keywords.len(),
            corpus = corpus.len(),
            matched = matches.len(),
            policy = %self.matcher.policy(),
            "trend run finished"
        );
        Ok(TrendRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            policy: self.matcher.policy(),
            mode: self.matcher.mode(),
            keywords_fetched: keywords.len(),
            corpus_size: corpus.len(),
            written,
            keywords: matches.into_iter().map(|m| m.keyword).collect(),
        })
    }
}
