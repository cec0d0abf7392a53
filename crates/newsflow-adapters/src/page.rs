//! Page loading behind one seam: static HTTP, a headless browser service, or
//! in-memory fixtures for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use crate::fetch::{FetchError, HttpFetcher};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("timed out loading {url}")]
    Timeout { url: String },
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("invalid url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl PageError {
    fn from_fetch(url: &str, err: FetchError) -> Self {
        match err {
            FetchError::Request(e) if e.is_timeout() => PageError::Timeout { url: url.to_string() },
            FetchError::HttpStatus { status, url } => PageError::HttpStatus { status, url },
            other => PageError::Navigation {
                url: url.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct WaitFor {
    pub selector: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Budget for navigation and content retrieval.
    pub timeout: Duration,
    /// Element that must exist before the content counts as loaded.
    pub wait_for: Option<WaitFor>,
}

impl LoadOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            wait_for: None,
        }
    }

    pub fn waiting_for(mut self, selector: impl Into<String>, timeout: Duration) -> Self {
        self.wait_for = Some(WaitFor {
            selector: selector.into(),
            timeout,
        });
        self
    }

    fn total_budget(&self) -> Duration {
        self.timeout + self.wait_for.as_ref().map(|w| w.timeout).unwrap_or_default()
    }
}

#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load(&self, url: &str, options: &LoadOptions) -> Result<LoadedPage, PageError>;
}

/// Rendered HTML plus the URL it was served from.
#[derive(Debug, Clone)]
pub struct LoadedPage {
    url: Url,
    html: String,
}

impl LoadedPage {
    pub fn new(url: &str, html: impl Into<String>) -> Result<Self, PageError> {
        let url = Url::parse(url).map_err(|source| PageError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(Self {
            url,
            html: html.into(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Every element matching `selector`, in document order.
    pub fn query(&self, selector: &str) -> Result<Vec<Element>, PageError> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);
        Ok(document
            .select(&selector)
            .map(|el| Element {
                text: collapse_whitespace(el.text()),
                attrs: el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                base: self.url.clone(),
            })
            .collect())
    }

    pub fn query_first(&self, selector: &str) -> Result<Option<Element>, PageError> {
        Ok(self.query(selector)?.into_iter().next())
    }
}

/// Joins text nodes the way rendered text reads: runs of whitespace, line
/// breaks included, become one space.
fn collapse_whitespace<'a>(nodes: impl Iterator<Item = &'a str>) -> String {
    let joined: String = nodes.collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_selector(selector: &str) -> Result<Selector, PageError> {
    Selector::parse(selector).map_err(|e| PageError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Owned snapshot of a matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    text: String,
    attrs: Vec<(String, String)>,
    base: Url,
}

impl Element {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The attribute resolved against the page URL. Empty values resolve to nothing.
    pub fn resolved_attr(&self, name: &str) -> Option<Url> {
        let raw = self.attr(name)?.trim();
        if raw.is_empty() {
            return None;
        }
        self.base.join(raw).ok()
    }
}

/// Plain GET through the shared [`HttpFetcher`]. Script-rendered content is
/// not seen, and a `wait_for` selector is only checked after the fact.
#[derive(Debug, Clone)]
pub struct HttpPageLoader {
    fetcher: HttpFetcher,
}

impl HttpPageLoader {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PageLoader for HttpPageLoader {
    #[instrument(skip(self, options), level = "debug")]
    async fn load(&self, url: &str, options: &LoadOptions) -> Result<LoadedPage, PageError> {
        let fetched = tokio::time::timeout(options.timeout, self.fetcher.fetch_text(url, options.timeout))
            .await
            .map_err(|_| PageError::Timeout { url: url.to_string() })?
            .map_err(|err| PageError::from_fetch(url, err))?;
        let page = LoadedPage::new(&fetched.final_url, fetched.body)?;
        require_wait_target(&page, options)?;
        Ok(page)
    }
}

fn require_wait_target(page: &LoadedPage, options: &LoadOptions) -> Result<(), PageError> {
    if let Some(wait) = &options.wait_for {
        if page.query_first(&wait.selector)?.is_none() {
            return Err(PageError::Timeout {
                url: page.url().to_string(),
            });
        }
    }
    Ok(())
}

/// Renders pages through a Browserless `/content` endpoint so script-built
/// markup is visible to the selectors.
#[derive(Debug, Clone)]
pub struct BrowserlessPageLoader {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessPageLoader {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request_body(url: &str, options: &LoadOptions) -> serde_json::Value {
        let mut body = json!({
            "url": url,
            "gotoOptions": {
                "waitUntil": "networkidle2",
                "timeout": options.timeout.as_millis() as u64,
            },
        });
        if let Some(wait) = &options.wait_for {
            body["waitForSelector"] = json!({
                "selector": wait.selector,
                "timeout": wait.timeout.as_millis() as u64,
            });
        }
        body
    }
}

#[async_trait]
impl PageLoader for BrowserlessPageLoader {
    #[instrument(skip(self, options), level = "debug")]
    async fn load(&self, url: &str, options: &LoadOptions) -> Result<LoadedPage, PageError> {
        let endpoint = format!("{}/content", self.base_url);
        let mut request = self
            .client
            .post(&endpoint)
            .timeout(options.total_budget() + Duration::from_secs(5))
            .json(&Self::request_body(url, options));
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PageError::Timeout { url: url.to_string() }
            } else {
                PageError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            debug!(%status, detail = %detail.chars().take(200).collect::<String>(), "browserless refused");
            // Browserless reports an unmet waitForSelector as a failed request.
            return Err(PageError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let html = response.text().await.map_err(|e| PageError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        LoadedPage::new(url, html)
    }
}

/// Serves canned HTML by URL. Unknown URLs answer 404; URLs registered with
/// [`FixturePageLoader::with_timeout`] time out.
#[derive(Debug, Clone, Default)]
pub struct FixturePageLoader {
    pages: HashMap<String, String>,
    timeouts: HashSet<String>,
    loads: Arc<Mutex<Vec<String>>>,
}

impl FixturePageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    pub fn with_timeout(mut self, url: impl Into<String>) -> Self {
        self.timeouts.insert(url.into());
        self
    }

    /// URLs requested so far, in request order.
    pub async fn loaded_urls(&self) -> Vec<String> {
        self.loads.lock().await.clone()
    }
}

#[async_trait]
impl PageLoader for FixturePageLoader {
    async fn load(&self, url: &str, options: &LoadOptions) -> Result<LoadedPage, PageError> {
        self.loads.lock().await.push(url.to_string());
        if self.timeouts.contains(url) {
            return Err(PageError::Timeout { url: url.to_string() });
        }
        let Some(html) = self.pages.get(url) else {
            return Err(PageError::HttpStatus {
                status: 404,
                url: url.to_string(),
            });
        };
        let page = LoadedPage::new(url, html.clone())?;
        require_wait_target(&page, options)?;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <h3><a href="/stiri/a">  Prima știre </a></h3>
          <img class="lazy" data-lazy-src="/img/a.jpg" src="data:image/gif;base64,R0lGOD">
          <a href="">empty</a>
        </body></html>
    "#;

    #[test]
    fn elements_carry_trimmed_text_and_resolved_attributes() {
        let page = LoadedPage::new("https://www.example.ro/stiri", LISTING).unwrap();
        let link = page.query_first("h3 a").unwrap().unwrap();
        assert_eq!(link.text(), "Prima știre");
        assert_eq!(
            link.resolved_attr("href").unwrap().as_str(),
            "https://www.example.ro/stiri/a"
        );

        let img = page.query_first("img.lazy").unwrap().unwrap();
        assert_eq!(img.attr("data-lazy-src"), Some("/img/a.jpg"));

        let empty = page.query("a").unwrap().pop().unwrap();
        assert_eq!(empty.resolved_attr("href"), None);
        assert_eq!(empty.resolved_attr("title"), None);
    }

    #[test]
    fn element_text_collapses_line_breaks_and_nested_nodes() {
        let html = "<h1>\n  Cutremur\n  <span>puternic</span>\tîn\r\n Vrancea  </h1>";
        let page = LoadedPage::new("https://www.example.ro/", html).unwrap();
        let title = page.query_first("h1").unwrap().unwrap();
        assert_eq!(title.text(), "Cutremur puternic în Vrancea");
    }

    #[test]
    fn invalid_selectors_surface_as_errors() {
        let page = LoadedPage::new("https://www.example.ro/", LISTING).unwrap();
        assert!(matches!(
            page.query("div[").unwrap_err(),
            PageError::InvalidSelector { .. }
        ));
    }

    #[test]
    fn browserless_body_includes_wait_target_only_when_requested() {
        let plain = LoadOptions::new(Duration::from_secs(60));
        let body = BrowserlessPageLoader::request_body("https://a.ro/", &plain);
        assert_eq!(body["gotoOptions"]["timeout"], 60_000);
        assert!(body.get("waitForSelector").is_none());

        let waiting = LoadOptions::new(Duration::from_secs(10)).waiting_for("h1", Duration::from_secs(5));
        let body = BrowserlessPageLoader::request_body("https://a.ro/x", &waiting);
        assert_eq!(body["waitForSelector"]["selector"], "h1");
        assert_eq!(body["waitForSelector"]["timeout"], 5_000);
    }

    #[tokio::test]
    async fn fixture_loader_serves_pages_and_records_requests() {
        let loader = FixturePageLoader::new()
            .with_page("https://a.ro/", "<h1>Titlu</h1>")
            .with_timeout("https://a.ro/slow");
        let options = LoadOptions::new(Duration::from_secs(1));

        assert!(loader.load("https://a.ro/", &options).await.is_ok());
        assert!(matches!(
            loader.load("https://a.ro/slow", &options).await,
            Err(PageError::Timeout { .. })
        ));
        assert!(matches!(
            loader.load("https://a.ro/missing", &options).await,
            Err(PageError::HttpStatus { status: 404, .. })
        ));

        let waiting = options.clone().waiting_for("article h1", Duration::from_secs(1));
        assert!(matches!(
            loader.load("https://a.ro/", &waiting).await,
            Err(PageError::Timeout { .. })
        ));

        assert_eq!(loader.loaded_urls().await.len(), 4);
    }
}
