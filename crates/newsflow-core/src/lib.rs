//! Core domain model for the newsflow ingestion and trend pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod text;

pub use text::normalize_text;

pub const CRATE_NAME: &str = "newsflow-core";

/// Canonical category used whenever a label cannot be classified.
pub const DEFAULT_CATEGORY: &str = "Actualitate";

/// Source categories whose listing pages tend to re-offer archived links.
pub const HIGH_VOLUME_CATEGORIES: &[&str] = &["Actualitate", "Sport"];

/// Which tables an existence check has to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    ActiveOnly,
    ActiveAndArchive,
}

impl DedupScope {
    pub fn for_category(category: &str) -> Self {
        if HIGH_VOLUME_CATEGORIES
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
        {
            Self::ActiveAndArchive
        } else {
            Self::ActiveOnly
        }
    }
}

/// Extracted-but-unclassified article; the handoff contract from adapters into the sync pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    pub image_src: String,
    pub intro: String,
    pub raw_label: String,
    pub url: String,
    pub source_name: String,
    pub category: String,
}

/// Classified article ready to be written to the active table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArticle {
    pub source: String,
    pub text: String,
    pub href: String,
    pub img_src: String,
    pub intro: String,
    pub label: String,
    pub cat: String,
}

impl NewArticle {
    pub fn from_draft(draft: ArticleDraft, label: String) -> Self {
        Self {
            source: draft.source_name,
            text: draft.title,
            href: draft.url,
            img_src: draft.image_src,
            intro: draft.intro,
            label,
            cat: draft.category,
        }
    }
}

/// Persisted article. The same shape is used for the active table, the archive
/// and the external corpus API, whose JSON uses `imgSrc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub source: String,
    pub text: String,
    pub href: String,
    #[serde(rename = "imgSrc")]
    pub img_src: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub cat: String,
    pub date: DateTime<Utc>,
}

pub type ArchivedArticle = Article;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendKeyword {
    pub id: i64,
    pub article_id: i64,
    pub keyword: String,
    pub date: DateTime<Utc>,
}

/// Secondary match for a trend keyword, denormalized from the matched article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendRelated {
    pub trend_id: i64,
    pub article_id: i64,
    pub text: String,
    pub intro: String,
    pub href: String,
    pub img_src: String,
    pub source: String,
    pub label: String,
    pub cat: String,
    pub date: DateTime<Utc>,
}

impl TrendRelated {
    pub fn from_article(trend_id: i64, article: &Article) -> Self {
        Self {
            trend_id,
            article_id: article.id,
            text: article.text.clone(),
            intro: article.intro.clone(),
            href: article.href.clone(),
            img_src: article.img_src.clone(),
            source: article.source.clone(),
            label: article.label.clone(),
            cat: article.cat.clone(),
            date: article.date,
        }
    }
}

/// One correlated keyword: the primary article plus any secondary matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendMatch {
    pub keyword: String,
    pub primary: Article,
    pub related: Vec<Article>,
}
