use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsflow_core::{Article, DedupScope, NewArticle, TrendKeyword, TrendMatch, TrendRelated};
use tokio::sync::Mutex;

use crate::{ArticleStore, InsertOutcome, RotationReport, StoreError, TrendWriteReport};

/// In-process [`ArticleStore`] with the same semantics as the Postgres one.
/// Backs `memory://` dry runs.
#[derive(Debug, Default)]
pub struct MemoryArticleStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    last_article_id: i64,
    last_trend_id: i64,
    articles: BTreeMap<i64, Article>,
    archive: BTreeMap<i64, Article>,
    trends: Vec<TrendKeyword>,
    related: Vec<TrendRelated>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts directly into the active table, bypassing the href check.
    pub async fn seed_article(&self, article: NewArticle, date: DateTime<Utc>) -> i64 {
        let mut state = self.state.lock().await;
        state.push_active(article, date)
    }

    /// Inserts directly into the archive table.
    pub async fn seed_archived(&self, article: Article) {
        let mut state = self.state.lock().await;
        state.last_article_id = state.last_article_id.max(article.id);
        state.archive.insert(article.id, article);
    }

    pub async fn active(&self) -> Vec<Article> {
        self.state.lock().await.articles.values().cloned().collect()
    }

    pub async fn archived(&self) -> Vec<Article> {
        self.state.lock().await.archive.values().cloned().collect()
    }

    pub async fn trend_keywords(&self) -> Vec<TrendKeyword> {
        self.state.lock().await.trends.clone()
    }

    pub async fn trend_related(&self) -> Vec<TrendRelated> {
        self.state.lock().await.related.clone()
    }
}

impl MemoryState {
    fn push_active(&mut self, article: NewArticle, date: DateTime<Utc>) -> i64 {
        self.last_article_id += 1;
        let id = self.last_article_id;
        self.articles.insert(
            id,
            Article {
                id,
                source: article.source,
                text: article.text,
                href: article.href,
                img_src: article.img_src,
                intro: article.intro,
                label: article.label,
                cat: article.cat,
                date,
            },
        );
        id
    }
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn rotate_archive(&self, cutoff: DateTime<Utc>) -> Result<RotationReport, StoreError> {
        let mut state = self.state.lock().await;
        let stale: Vec<Article> = state
            .articles
            .values()
            .filter(|a| a.date < cutoff)
            .cloned()
            .collect();
        let archived = stale.len() as u64;
        for article in stale {
            state.archive.insert(article.id, article);
        }
        let before = state.articles.len();
        state.articles.retain(|_, a| a.date >= cutoff);
        let removed = (before - state.articles.len()) as u64;
        Ok(RotationReport { archived, removed })
    }

    async fn existing_hrefs(
        &self,
        hrefs: &[String],
        scope: DedupScope,
    ) -> Result<HashSet<String>, StoreError> {
        let state = self.state.lock().await;
        let wanted: HashSet<&str> = hrefs.iter().map(String::as_str).collect();
        let mut found: HashSet<String> = state
            .articles
            .values()
            .filter(|a| wanted.contains(a.href.as_str()))
            .map(|a| a.href.clone())
            .collect();
        if scope == DedupScope::ActiveAndArchive {
            found.extend(
                state
                    .archive
                    .values()
                    .filter(|a| wanted.contains(a.href.as_str()))
                    .map(|a| a.href.clone()),
            );
        }
        Ok(found)
    }

    async fn insert_article(
        &self,
        article: &NewArticle,
        inserted_at: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError> {
        let mut state = self.state.lock().await;
        if state.articles.values().any(|a| a.href == article.href) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        let id = state.push_active(article.clone(), inserted_at);
        Ok(InsertOutcome::Inserted { id })
    }

    async fn recent_articles(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        let state = self.state.lock().await;
        let mut articles: Vec<Article> = state.articles.values().cloned().collect();
        articles.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        articles.truncate(limit);
        Ok(articles)
    }

    async fn replace_trends(&self, matches: &[TrendMatch]) -> Result<TrendWriteReport, StoreError> {
        let mut state = self.state.lock().await;
        state.related.clear();
        state.trends.clear();
        let mut related = 0usize;
        for m in matches {
            state.last_trend_id += 1;
            let trend_id = state.last_trend_id;
            state.trends.push(TrendKeyword {
                id: trend_id,
                article_id: m.primary.id,
                keyword: m.keyword.clone(),
                date: m.primary.date,
            });
            for article in &m.related {
                state.related.push(TrendRelated::from_article(trend_id, article));
            }
            related += m.related.len();
        }
        Ok(TrendWriteReport {
            keywords: matches.len(),
            related,
        })
    }
}
