use std::collections::BTreeSet;

use newsflow_core::DedupScope;
use newsflow_storage::{ArticleStore, StoreError};
use tracing::debug;

/// Drops candidates whose href is already stored. High-volume categories are
/// checked against the archive too, since their listing pages keep offering
/// links after rotation.
pub async fn filter_new_links(
    store: &dyn ArticleStore,
    candidates: BTreeSet<String>,
    category: &str,
) -> Result<Vec<String>, StoreError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let scope = DedupScope::for_category(category);
    let candidates: Vec<String> = candidates.into_iter().collect();
    let existing = store.existing_hrefs(&candidates, scope).await?;
    let fresh: Vec<String> = candidates
        .into_iter()
        .filter(|href| !existing.contains(href))
        .collect();
    debug!(?scope, existing = existing.len(), fresh = fresh.len(), "dedup filter");
    Ok(fresh)
}
