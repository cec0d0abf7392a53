use std::time::Duration;

use futures::future::join_all;
use newsflow_core::{ArticleDraft, DEFAULT_CATEGORY};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::config::{SelectorList, SourceProfile};
use crate::page::{LoadOptions, LoadedPage, PageError, PageLoader};

/// Lazy-loading themes keep the real image URL here and a placeholder in `src`.
pub const LAZY_IMAGE_ATTR: &str = "data-lazy-src";

/// Raw labels longer than this are breadcrumb noise, not categories.
pub const MAX_LABEL_WORDS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub navigation_timeout: Duration,
    pub title_timeout: Duration,
    /// Detail pages loaded at once per source.
    pub concurrency: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(10),
            title_timeout: Duration::from_secs(5),
            concurrency: 5,
        }
    }
}

/// Loads one detail page. `Ok(None)` means the page loaded but lacks a title
/// or an image and is not worth storing.
#[instrument(skip(loader, profile, options), fields(source = %profile.name))]
pub async fn extract_article(
    loader: &dyn PageLoader,
    profile: &SourceProfile,
    url: &str,
    options: &ExtractOptions,
) -> Result<Option<ArticleDraft>, PageError> {
    let load = LoadOptions::new(options.navigation_timeout)
        .waiting_for(profile.detail_selectors.title.css_group(), options.title_timeout);
    let page = loader.load(url, &load).await?;
    draft_from_page(&page, profile, url)
}

/// Applies the profile's detail selectors to an already loaded page.
pub fn draft_from_page(
    page: &LoadedPage,
    profile: &SourceProfile,
    url: &str,
) -> Result<Option<ArticleDraft>, PageError> {
    let selectors = &profile.detail_selectors;

    let title = first_text(page, &selectors.title)?.unwrap_or_default();
    let image_src = first_image(page, &selectors.image)?.unwrap_or_default();
    if title.is_empty() || image_src.is_empty() {
        debug!(url, has_title = !title.is_empty(), has_image = !image_src.is_empty(), "incomplete page");
        return Ok(None);
    }

    let intro = first_text(page, &selectors.intro)?.unwrap_or_default();
    let raw_label = match &profile.fixed_label {
        Some(label) => label.clone(),
        None => first_text(page, &selectors.label)?.unwrap_or_default(),
    };

    Ok(Some(ArticleDraft {
        title,
        image_src,
        intro,
        raw_label: screen_label(&raw_label),
        url: url.to_string(),
        source_name: profile.name.clone(),
        category: profile.category.clone(),
    }))
}

/// Keeps short labels as-is and replaces long ones with the default category.
pub fn screen_label(raw: &str) -> String {
    let raw = raw.trim();
    if raw.split_whitespace().count() > MAX_LABEL_WORDS {
        DEFAULT_CATEGORY.to_string()
    } else {
        raw.to_string()
    }
}

/// Text of the first element of the first selector that yields non-empty text.
fn first_text(page: &LoadedPage, selectors: &SelectorList) -> Result<Option<String>, PageError> {
    for selector in selectors.iter() {
        if let Some(element) = page.query_first(selector)? {
            let text = element.text();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }
    Ok(None)
}

fn first_image(page: &LoadedPage, selectors: &SelectorList) -> Result<Option<String>, PageError> {
    for selector in selectors.iter() {
        let Some(element) = page.query_first(selector)? else {
            continue;
        };
        let resolved = element
            .resolved_attr(LAZY_IMAGE_ATTR)
            .or_else(|| element.resolved_attr("src"));
        if let Some(url) = resolved {
            return Ok(Some(url.to_string()));
        }
    }
    Ok(None)
}

/// Extracts every URL with at most `options.concurrency` loads in flight. A
/// slot frees as soon as any load finishes. Failed and incomplete pages are
/// logged and left out; the returned drafts keep the order of `urls`.
pub async fn extract_articles(
    loader: &dyn PageLoader,
    profile: &SourceProfile,
    urls: &[String],
    options: &ExtractOptions,
) -> Vec<ArticleDraft> {
    let slots = Semaphore::new(options.concurrency.max(1));
    let pending: Vec<_> = urls
        .iter()
        .map(|url| extract_in_slot(&slots, loader, profile, url, options))
        .collect();
    join_all(pending).await.into_iter().flatten().collect()
}

async fn extract_in_slot(
    slots: &Semaphore,
    loader: &dyn PageLoader,
    profile: &SourceProfile,
    url: &str,
    options: &ExtractOptions,
) -> Option<ArticleDraft> {
    // The semaphore is never closed.
    let _permit = slots.acquire().await.ok()?;
    match extract_article(loader, profile, url, options).await {
        Ok(Some(draft)) => Some(draft),
        Ok(None) => {
            warn!(source = %profile.name, %url, "dropped page without title or image");
            None
        }
        Err(err) => {
            warn!(source = %profile.name, %url, error = %err, "detail extraction failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetailSelectors;
    use crate::page::FixturePageLoader;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn profile() -> SourceProfile {
        SourceProfile {
            name: "csid.ro".into(),
            category: "Sănătate".into(),
            url: "https://www.csid.ro".into(),
            enabled: true,
            link_selectors: vec!["h3 a".into()],
            detail_selectors: DetailSelectors {
                title: SelectorList::new(["h1.title", "h1"]),
                image: SelectorList::new(["div.media img", "article img"]),
                intro: SelectorList::new(["div.excerpt", "div.content p"]),
                label: SelectorList::new(["div.breadcrumbs a.cat"]),
            },
            fixed_label: None,
        }
    }

    fn detail(title: &str, img: &str, label: &str) -> String {
        format!(
            r#"<html><body>
              <h1>{title}</h1>
              <div class="breadcrumbs"><a class="cat">{label}</a></div>
              <article>{img}</article>
              <div class="excerpt">   </div>
              <div class="content"><p>Primul paragraf.</p><p>Al doilea.</p></div>
            </body></html>"#
        )
    }

    #[test]
    fn lazy_image_attribute_wins_and_fallback_selectors_apply() {
        let html = detail(
            "Vaccinul gripal",
            r#"<img data-lazy-src="/wp/flu.jpg" src="data:image/gif;base64,AAAA">"#,
            "Sănătate",
        );
        let page = LoadedPage::new("https://www.csid.ro/sanatate/flu", html).unwrap();
        let draft = draft_from_page(&page, &profile(), "https://www.csid.ro/sanatate/flu")
            .unwrap()
            .unwrap();

        assert_eq!(draft.title, "Vaccinul gripal");
        assert_eq!(draft.image_src, "https://www.csid.ro/wp/flu.jpg");
        // Empty excerpt falls through to the next intro selector.
        assert_eq!(draft.intro, "Primul paragraf.");
        assert_eq!(draft.raw_label, "Sănătate");
        assert_eq!(draft.category, "Sănătate");
        assert_eq!(draft.source_name, "csid.ro");
    }

    #[test]
    fn pages_without_image_are_dropped() {
        let page = LoadedPage::new("https://www.csid.ro/x", detail("Titlu", "", "Sănătate")).unwrap();
        assert!(draft_from_page(&page, &profile(), "https://www.csid.ro/x")
            .unwrap()
            .is_none());
    }

    #[test]
    fn long_labels_collapse_to_the_default_category() {
        assert_eq!(screen_label("  Sport "), "Sport");
        assert_eq!(screen_label("Politică externă"), "Politică externă");
        assert_eq!(screen_label("Acasă Știri Politică Internă"), DEFAULT_CATEGORY);
    }

    #[test]
    fn fixed_label_overrides_the_page() {
        let mut profile = profile();
        profile.fixed_label = Some("Economie".into());
        let page = LoadedPage::new(
            "https://www.csid.ro/x",
            detail("Titlu", r#"<img src="/a.jpg">"#, "Sănătate"),
        )
        .unwrap();
        let draft = draft_from_page(&page, &profile, "https://www.csid.ro/x")
            .unwrap()
            .unwrap();
        assert_eq!(draft.raw_label, "Economie");
    }

    #[tokio::test]
    async fn batch_skips_failures_and_keeps_input_order() {
        let img = r#"<img src="/a.jpg">"#;
        let loader = FixturePageLoader::new()
            .with_page("https://www.csid.ro/1", detail("Unu", img, "Sănătate"))
            .with_page("https://www.csid.ro/2", "<p>no title here</p>")
            .with_timeout("https://www.csid.ro/3")
            .with_page("https://www.csid.ro/4", detail("Patru", img, "Sănătate"));
        let urls: Vec<String> = (1..=5).map(|i| format!("https://www.csid.ro/{i}")).collect();

        let drafts = extract_articles(&loader, &profile(), &urls, &ExtractOptions::default()).await;

        let titles: Vec<_> = drafts.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Unu", "Patru"]);
        assert_eq!(loader.loaded_urls().await.len(), 5);
    }

    struct CountingLoader {
        inner: FixturePageLoader,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PageLoader for CountingLoader {
        async fn load(&self, url: &str, options: &LoadOptions) -> Result<LoadedPage, PageError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let result = self.inner.load(url, options).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[tokio::test]
    async fn no_more_than_the_configured_loads_run_at_once() {
        let mut inner = FixturePageLoader::new();
        let mut urls = Vec::new();
        for i in 0..12 {
            let url = format!("https://www.csid.ro/{i}");
            inner = inner.with_page(url.clone(), detail("T", r#"<img src="/a.jpg">"#, "S"));
            urls.push(url);
        }
        let loader = Arc::new(CountingLoader {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let options = ExtractOptions {
            concurrency: 3,
            ..ExtractOptions::default()
        };

        let drafts = extract_articles(loader.as_ref(), &profile(), &urls, &options).await;

        assert_eq!(drafts.len(), 12);
        assert!(loader.peak.load(Ordering::SeqCst) <= 3);
        assert!(loader.peak.load(Ordering::SeqCst) >= 2);
    }

    struct SlowFirstLoader {
        inner: FixturePageLoader,
        slow_url: String,
        slow_done: AtomicBool,
        started_while_slow: AtomicUsize,
    }

    #[async_trait]
    impl PageLoader for SlowFirstLoader {
        async fn load(&self, url: &str, options: &LoadOptions) -> Result<LoadedPage, PageError> {
            if url == self.slow_url {
                tokio::time::sleep(Duration::from_millis(300)).await;
                self.slow_done.store(true, Ordering::SeqCst);
            } else {
                if !self.slow_done.load(Ordering::SeqCst) {
                    self.started_while_slow.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            self.inner.load(url, options).await
        }
    }

    #[tokio::test]
    async fn one_slow_page_does_not_hold_back_the_rest() {
        let mut inner = FixturePageLoader::new();
        let mut urls = Vec::new();
        for i in 0..10 {
            let url = format!("https://www.csid.ro/{i}");
            inner = inner.with_page(url.clone(), detail(&format!("T{i}"), r#"<img src="/a.jpg">"#, "S"));
            urls.push(url);
        }
        let loader = SlowFirstLoader {
            inner,
            slow_url: urls[0].clone(),
            slow_done: AtomicBool::new(false),
            started_while_slow: AtomicUsize::new(0),
        };
        let options = ExtractOptions {
            concurrency: 5,
            ..ExtractOptions::default()
        };

        let drafts = extract_articles(&loader, &profile(), &urls, &options).await;

        assert_eq!(drafts.len(), 10);
        assert_eq!(drafts[0].title, "T0");
        assert_eq!(loader.started_while_slow.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn multi_line_titles_are_read_as_single_spaced_text() {
        let html = detail(
            "Cutremur\n                puternic\tin Vrancea",
            r#"<img src="/a.jpg">"#,
            "Eveniment",
        );
        let page = LoadedPage::new("https://www.csid.ro/cutremur", html).unwrap();
        let draft = draft_from_page(&page, &profile(), "https://www.csid.ro/cutremur")
            .unwrap()
            .unwrap();
        assert_eq!(draft.title, "Cutremur puternic in Vrancea");
    }
}
