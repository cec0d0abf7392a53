//! Source configuration, page loading, link discovery and detail extraction.

pub mod config;
pub mod discovery;
pub mod extract;
pub mod fetch;
pub mod page;

pub use config::{ConfigError, DetailSelectors, SelectorList, SourceProfile, SourceRegistry};
pub use discovery::{collect_links, discover_links};
pub use extract::{draft_from_page, extract_article, extract_articles, screen_label, ExtractOptions};
pub use fetch::{BackoffPolicy, FetchError, HttpClientConfig, HttpFetcher};
pub use page::{
    BrowserlessPageLoader, Element, FixturePageLoader, HttpPageLoader, LoadOptions, LoadedPage,
    PageError, PageLoader, WaitFor,
};

pub const CRATE_NAME: &str = "newsflow-adapters";
