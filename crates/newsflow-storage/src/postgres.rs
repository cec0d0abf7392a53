use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsflow_core::{Article, DedupScope, NewArticle, TrendMatch};
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{debug, info};

use crate::{ArticleStore, InsertOutcome, RotationReport, StoreClient, StoreError, TrendWriteReport};

const ROTATE_COPY_SQL: &str = r#"
INSERT INTO archive (id, source, text, href, img_src, intro, label, cat, "date")
SELECT id, source, text, href, img_src, intro, label, cat, "date"
FROM articles
WHERE "date" < $1
ON CONFLICT (id) DO UPDATE SET
    source = EXCLUDED.source,
    text = EXCLUDED.text,
    href = EXCLUDED.href,
    img_src = EXCLUDED.img_src,
    intro = EXCLUDED.intro,
    label = EXCLUDED.label,
    cat = EXCLUDED.cat,
    "date" = EXCLUDED."date"
"#;

const ROTATE_DELETE_SQL: &str = r#"DELETE FROM articles WHERE "date" < $1"#;

const EXISTING_ACTIVE_SQL: &str = "SELECT href FROM articles WHERE href = ANY($1)";

const EXISTING_ACTIVE_AND_ARCHIVE_SQL: &str = r#"
SELECT href FROM articles WHERE href = ANY($1)
UNION
SELECT href FROM archive WHERE href = ANY($1)
"#;

const INSERT_ARTICLE_SQL: &str = r#"
INSERT INTO articles (source, text, href, img_src, intro, label, cat, "date")
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (href) DO NOTHING
RETURNING id
"#;

const RECENT_ARTICLES_SQL: &str = r#"
SELECT id, source, text, href, img_src, intro, label, cat, "date"
FROM articles
ORDER BY "date" DESC, id DESC
LIMIT $1
"#;

const INSERT_TREND_SQL: &str =
    r#"INSERT INTO trends (article_id, keyword, "date") VALUES ($1, $2, $3) RETURNING id"#;

#[derive(Debug, FromRow)]
struct ArticleRow {
    id: i64,
    source: String,
    text: String,
    href: String,
    img_src: String,
    intro: String,
    label: String,
    cat: String,
    date: DateTime<Utc>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: row.id,
            source: row.source,
            text: row.text,
            href: row.href,
            img_src: row.img_src,
            intro: row.intro,
            label: row.label,
            cat: row.cat,
            date: row.date,
        }
    }
}

/// Postgres-backed [`ArticleStore`]; every statement goes through the
/// retry-wrapped [`StoreClient`].
#[derive(Debug, Clone)]
pub struct PgArticleStore {
    client: StoreClient,
}

impl PgArticleStore {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &StoreClient {
        &self.client
    }
}

#[async_trait]
impl ArticleStore for PgArticleStore {
    async fn rotate_archive(&self, cutoff: DateTime<Utc>) -> Result<RotationReport, StoreError> {
        // Two statements: a crash in between leaves rows in both tables, and the
        // next rotation's upsert absorbs them.
        let archived = self
            .client
            .execute("rotate_archive.copy", |pool| async move {
                sqlx::query(ROTATE_COPY_SQL)
                    .bind(cutoff)
                    .execute(&pool)
                    .await
                    .map(|r| r.rows_affected())
            })
            .await?;
        let removed = self
            .client
            .execute("rotate_archive.delete", |pool| async move {
                sqlx::query(ROTATE_DELETE_SQL)
                    .bind(cutoff)
                    .execute(&pool)
                    .await
                    .map(|r| r.rows_affected())
            })
            .await?;
        info!(%cutoff, archived, removed, "archive rotation finished");
        Ok(RotationReport { archived, removed })
    }

    async fn existing_hrefs(
        &self,
        hrefs: &[String],
        scope: DedupScope,
    ) -> Result<HashSet<String>, StoreError> {
        if hrefs.is_empty() {
            return Ok(HashSet::new());
        }
        let sql = match scope {
            DedupScope::ActiveOnly => EXISTING_ACTIVE_SQL,
            DedupScope::ActiveAndArchive => EXISTING_ACTIVE_AND_ARCHIVE_SQL,
        };
        let rows = self
            .client
            .execute("existing_hrefs", |pool| async move {
                sqlx::query_scalar::<_, String>(sql)
                    .bind(hrefs)
                    .fetch_all(&pool)
                    .await
            })
            .await?;
        debug!(candidates = hrefs.len(), existing = rows.len(), ?scope, "existence check");
        Ok(rows.into_iter().collect())
    }

    async fn insert_article(
        &self,
        article: &NewArticle,
        inserted_at: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError> {
        let result = self
            .client
            .execute("insert_article", |pool| async move {
                sqlx::query_scalar::<_, i64>(INSERT_ARTICLE_SQL)
                    .bind(&article.source)
                    .bind(&article.text)
                    .bind(&article.href)
                    .bind(&article.img_src)
                    .bind(&article.intro)
                    .bind(&article.label)
                    .bind(&article.cat)
                    .bind(inserted_at)
                    .fetch_optional(&pool)
                    .await
            })
            .await;
        match result {
            Ok(Some(id)) => Ok(InsertOutcome::Inserted { id }),
            Ok(None) | Err(StoreError::UniqueViolation { .. }) => Ok(InsertOutcome::AlreadyExists),
            Err(err) => Err(err),
        }
    }

    async fn recent_articles(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .client
            .execute("recent_articles", |pool| async move {
                sqlx::query_as::<_, ArticleRow>(RECENT_ARTICLES_SQL)
                    .bind(limit)
                    .fetch_all(&pool)
                    .await
            })
            .await?;
        Ok(rows.into_iter().map(Article::from).collect())
    }

    async fn replace_trends(&self, matches: &[TrendMatch]) -> Result<TrendWriteReport, StoreError> {
        let report = self
            .client
            .execute("replace_trends", |pool| async move {
                let mut tx = pool.begin().await?;
                sqlx::query("DELETE FROM trends_related").execute(&mut *tx).await?;
                sqlx::query("DELETE FROM trends").execute(&mut *tx).await?;

                let mut related = 0usize;
                for m in matches {
                    let trend_id: i64 = sqlx::query_scalar(INSERT_TREND_SQL)
                        .bind(m.primary.id)
                        .bind(&m.keyword)
                        .bind(m.primary.date)
                        .fetch_one(&mut *tx)
                        .await?;

                    if m.related.is_empty() {
                        continue;
                    }
                    let mut builder = QueryBuilder::<Postgres>::new(
                        r#"INSERT INTO trends_related (trends_id, article_id, text, intro, href, img_src, source, label, cat, "date") "#,
                    );
                    builder.push_values(&m.related, |mut row, article| {
                        row.push_bind(trend_id)
                            .push_bind(article.id)
                            .push_bind(&article.text)
                            .push_bind(&article.intro)
                            .push_bind(&article.href)
                            .push_bind(&article.img_src)
                            .push_bind(&article.source)
                            .push_bind(&article.label)
                            .push_bind(&article.cat)
                            .push_bind(article.date);
                    });
                    builder.build().execute(&mut *tx).await?;
                    related += m.related.len();
                }

                tx.commit().await?;
                Ok(TrendWriteReport {
                    keywords: matches.len(),
                    related,
                })
            })
            .await?;
        info!(keywords = report.keywords, related = report.related, "trend rows replaced");
        Ok(report)
    }
}
