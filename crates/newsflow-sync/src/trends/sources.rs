use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use newsflow_adapters::{LoadOptions, PageLoader};
use newsflow_core::Article;
use newsflow_storage::ArticleStore;
use serde::Deserialize;
use tracing::debug;

/// Current trending search queries for one region, most prominent first.
#[async_trait]
pub trait TrendingSource: Send + Sync {
    async fn keywords(&self) -> Result<Vec<String>>;
}

/// Recent articles to correlate keywords against, newest first.
#[async_trait]
pub trait CorpusSource: Send + Sync {
    async fn articles(&self) -> Result<Vec<Article>>;
}

/// Reads keywords as the text of every element matching `selector` on a
/// trends page.
pub struct PageTrendingSource {
    loader: Arc<dyn PageLoader>,
    url: String,
    selector: String,
    timeout: Duration,
}

impl PageTrendingSource {
    pub fn new(
        loader: Arc<dyn PageLoader>,
        url: impl Into<String>,
        selector: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            loader,
            url: url.into(),
            selector: selector.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TrendingSource for PageTrendingSource {
    async fn keywords(&self) -> Result<Vec<String>> {
        let page = self
            .loader
            .load(&self.url, &LoadOptions::new(self.timeout))
            .await
            .with_context(|| format!("loading trends page {}", self.url))?;
        let keywords: Vec<String> = page
            .query(&self.selector)?
            .iter()
            .map(|el| el.text().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        debug!(count = keywords.len(), "trending keywords read");
        Ok(keywords)
    }
}

#[derive(Debug, Deserialize)]
struct CorpusEnvelope {
    #[serde(default)]
    data: Vec<Article>,
}

/// Fetches the corpus from a JSON API shaped `{"data": [article, ...]}`.
pub struct HttpCorpusSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpCorpusSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CorpusSource for HttpCorpusSource {
    async fn articles(&self) -> Result<Vec<Article>> {
        let envelope: CorpusEnvelope = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("requesting {}", self.url))?
            .error_for_status()
            .with_context(|| format!("corpus api {}", self.url))?
            .json()
            .await
            .with_context(|| format!("decoding corpus from {}", self.url))?;
        Ok(envelope.data)
    }
}

/// Reads the corpus straight from the active table.
pub struct StoreCorpusSource {
    store: Arc<dyn ArticleStore>,
    limit: usize,
}

impl StoreCorpusSource {
    pub fn new(store: Arc<dyn ArticleStore>, limit: usize) -> Self {
        Self { store, limit }
    }
}

#[async_trait]
impl CorpusSource for StoreCorpusSource {
    async fn articles(&self) -> Result<Vec<Article>> {
        self.store
            .recent_articles(self.limit)
            .await
            .context("reading recent articles")
    }
}

/// Fixed keyword list.
pub struct StaticTrendingSource(pub Vec<String>);

#[async_trait]
impl TrendingSource for StaticTrendingSource {
    async fn keywords(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsflow_adapters::FixturePageLoader;

    const TRENDS_PAGE: &str = r#"
        <table><tbody>
          <tr><td><div class="mZ3RIc">Simona Halep</div></td></tr>
          <tr><td><div class="mZ3RIc">  cutremur azi </div></td></tr>
          <tr><td><div class="mZ3RIc"> </div></td></tr>
        </tbody></table>
    "#;

    #[tokio::test]
    async fn keywords_are_read_in_page_order() {
        let url = "https://trends.google.com/trending?geo=RO";
        let loader = Arc::new(FixturePageLoader::new().with_page(url, TRENDS_PAGE));
        let source = PageTrendingSource::new(loader, url, "div.mZ3RIc", Duration::from_secs(60));

        let keywords = source.keywords().await.unwrap();

        assert_eq!(keywords, vec!["Simona Halep", "cutremur azi"]);
    }

    #[tokio::test]
    async fn unreachable_trends_page_is_an_error() {
        let loader = Arc::new(FixturePageLoader::new());
        let source = PageTrendingSource::new(loader, "https://trends.example/", "div", Duration::from_secs(1));
        let err = source.keywords().await.unwrap_err();
        assert!(format!("{err:#}").contains("loading trends page"));
    }

    #[test]
    fn corpus_envelope_tolerates_missing_data() {
        let empty: CorpusEnvelope = serde_json::from_str("{}").unwrap();
        assert!(empty.data.is_empty());

        let one: CorpusEnvelope = serde_json::from_str(
            r#"{"data":[{"id":7,"source":"hotnews.ro","text":"Titlu","href":"https://hotnews.ro/a",
                "imgSrc":"https://hotnews.ro/a.jpg","intro":"","label":"Actualitate","cat":"Actualitate",
                "date":"2025-03-01T08:00:00.000Z"}]}"#,
        )
        .unwrap();
        assert_eq!(one.data[0].id, 7);
    }
}
