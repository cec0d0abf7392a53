use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::config::SourceProfile;
use crate::page::{LoadOptions, LoadedPage, PageError, PageLoader};

/// Loads the listing page and returns the distinct article links on it.
#[instrument(skip_all, fields(source = %profile.name))]
pub async fn discover_links(
    loader: &dyn PageLoader,
    profile: &SourceProfile,
    timeout: Duration,
) -> Result<BTreeSet<String>, PageError> {
    let page = loader.load(&profile.url, &LoadOptions::new(timeout)).await?;
    collect_links(&page, profile)
}

/// Absolute, fragment-free hrefs under the source's base URL. The listing
/// page itself is never a candidate.
pub fn collect_links(page: &LoadedPage, profile: &SourceProfile) -> Result<BTreeSet<String>, PageError> {
    let mut seen = 0usize;
    let mut links = BTreeSet::new();
    for selector in &profile.link_selectors {
        for element in page.query(selector)? {
            let Some(mut href) = element.resolved_attr("href") else {
                continue;
            };
            href.set_fragment(None);
            seen += 1;
            let href = href.to_string();
            if href.starts_with(&profile.url) && href.trim_end_matches('/') != profile.url.trim_end_matches('/') {
                links.insert(href);
            }
        }
    }
    debug!(matched = seen, kept = links.len(), "links collected");
    Ok(links)
}
