use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use newsflow_adapters::{FixturePageLoader, SourceRegistry};
use newsflow_core::NewArticle;
use newsflow_storage::MemoryArticleStore;
use newsflow_sync::trends::{StaticTrendingSource, StoreCorpusSource, TrendingSource};
use newsflow_sync::{
    IngestOptions, IngestionPipeline, LabelClassifier, MatchMode, MatchPolicy, TrendMatcher,
    TrendPipeline,
};

fn article(slug: &str, text: &str, intro: &str) -> NewArticle {
    NewArticle {
        source: "digi24.ro".into(),
        text: text.into(),
        href: format!("https://www.digi24.ro/stiri/{slug}"),
        img_src: format!("https://www.digi24.ro/img/{slug}.jpg"),
        intro: intro.into(),
        label: "Politică".into(),
        cat: "Actualitate".into(),
    }
}

/// Seeds three articles, oldest first, and returns their ids in that order.
async fn seeded_store() -> (Arc<MemoryArticleStore>, [i64; 3]) {
    let store = Arc::new(MemoryArticleStore::new());
    let now = Utc::now();
    let oldest = store
        .seed_article(
            article("jurament", "Nicușor Dan a depus jurământul", "Ceremonia a avut loc la Parlament."),
            now - Duration::hours(3),
        )
        .await;
    let middle = store
        .seed_article(
            article("direct", "Jurământul lui Nicușor Dan, în direct", ""),
            now - Duration::hours(2),
        )
        .await;
    let newest = store
        .seed_article(
            article("retele", "Dan Nicușor, glumă pe rețele", "Nicușor este un nume comun."),
            now - Duration::hours(1),
        )
        .await;
    (store, [oldest, middle, newest])
}

fn pipeline(
    store: &Arc<MemoryArticleStore>,
    trending: Arc<dyn TrendingSource>,
    policy: MatchPolicy,
    mode: MatchMode,
) -> TrendPipeline {
    TrendPipeline::new(
        trending,
        Arc::new(StoreCorpusSource::new(store.clone(), 1000)),
        store.clone(),
        TrendMatcher::new(policy, mode),
    )
}

fn keywords(words: &[&str]) -> Arc<dyn TrendingSource> {
    Arc::new(StaticTrendingSource(words.iter().map(|w| w.to_string()).collect()))
}

struct UnreachableTrends;

#[async_trait]
impl TrendingSource for UnreachableTrends {
    async fn keywords(&self) -> Result<Vec<String>> {
        Err(anyhow!("trends page timed out"))
    }
}

#[tokio::test]
async fn unordered_multi_keeps_the_newest_match_as_primary() {
    let (store, [oldest, middle, newest]) = seeded_store().await;

    let summary = pipeline(
        &store,
        keywords(&["Nicusor Dan", "Ilie Bolojan", "a b c"]),
        MatchPolicy::UnorderedTokens,
        MatchMode::Multi,
    )
    .run_once()
    .await
    .unwrap();

    assert_eq!(summary.keywords_fetched, 3);
    assert_eq!(summary.corpus_size, 3);
    assert_eq!(summary.keywords, vec!["Nicusor Dan".to_string()]);
    assert_eq!(summary.written.keywords, 1);
    assert_eq!(summary.written.related, 2);

    let trends = store.trend_keywords().await;
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].article_id, newest);
    let related: Vec<i64> = store.trend_related().await.iter().map(|r| r.article_id).collect();
    assert_eq!(related, vec![middle, oldest]);
    assert!(store.trend_related().await.iter().all(|r| r.trend_id == trends[0].id));
}

#[tokio::test]
async fn ordered_policy_skips_articles_with_the_words_reversed() {
    let (store, [oldest, middle, _newest]) = seeded_store().await;

    pipeline(
        &store,
        keywords(&["Nicusor Dan"]),
        MatchPolicy::OrderedInSentence,
        MatchMode::Multi,
    )
    .run_once()
    .await
    .unwrap();

    let trends = store.trend_keywords().await;
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].article_id, middle);
    let related: Vec<i64> = store.trend_related().await.iter().map(|r| r.article_id).collect();
    assert_eq!(related, vec![oldest]);
}

#[tokio::test]
async fn single_mode_writes_no_related_rows() {
    let (store, [_, middle, _]) = seeded_store().await;

    let summary = pipeline(
        &store,
        keywords(&["nicușor dan"]),
        MatchPolicy::OrderedInSentence,
        MatchMode::Single,
    )
    .run_once()
    .await
    .unwrap();

    assert_eq!(summary.written.related, 0);
    assert_eq!(store.trend_keywords().await[0].article_id, middle);
    assert!(store.trend_related().await.is_empty());
}

#[tokio::test]
async fn each_run_replaces_the_previous_correlations() {
    let (store, [oldest, _, _]) = seeded_store().await;

    pipeline(&store, keywords(&["Nicusor Dan"]), MatchPolicy::UnorderedTokens, MatchMode::Multi)
        .run_once()
        .await
        .unwrap();
    pipeline(&store, keywords(&["Parlament"]), MatchPolicy::UnorderedTokens, MatchMode::Multi)
        .run_once()
        .await
        .unwrap();

    let trends = store.trend_keywords().await;
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].keyword, "Parlament");
    assert_eq!(trends[0].article_id, oldest);
    assert!(store.trend_related().await.is_empty());
}

#[tokio::test]
async fn failing_keyword_source_leaves_stored_trends_untouched() {
    let (store, _) = seeded_store().await;

    pipeline(&store, keywords(&["Nicusor Dan"]), MatchPolicy::UnorderedTokens, MatchMode::Multi)
        .run_once()
        .await
        .unwrap();
    let before = store.trend_keywords().await;

    let err = pipeline(
        &store,
        Arc::new(UnreachableTrends),
        MatchPolicy::UnorderedTokens,
        MatchMode::Multi,
    )
    .run_once()
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("fetching trending keywords"));
    assert_eq!(store.trend_keywords().await, before);
    assert_eq!(store.trend_related().await.len(), 2);
}

#[tokio::test]
async fn no_matches_clears_the_previous_run() {
    let (store, _) = seeded_store().await;

    pipeline(&store, keywords(&["Nicusor Dan"]), MatchPolicy::UnorderedTokens, MatchMode::Multi)
        .run_once()
        .await
        .unwrap();
    let summary = pipeline(&store, keywords(&["Ilie Bolojan"]), MatchPolicy::UnorderedTokens, MatchMode::Multi)
        .run_once()
        .await
        .unwrap();

    assert!(summary.keywords.is_empty());
    assert!(store.trend_keywords().await.is_empty());
    assert!(store.trend_related().await.is_empty());
}

#[tokio::test]
async fn titles_broken_across_lines_still_match_their_words() {
    let store = Arc::new(MemoryArticleStore::new());
    let registry = SourceRegistry::from_yaml_str(
        r#"
sources:
  - name: digi24.ro
    category: Actualitate
    url: https://www.digi24.ro
    link_selectors: ["h3 a"]
    detail_selectors:
      title: h1
      image: figure img
"#,
    )
    .unwrap();
    let loader = Arc::new(
        FixturePageLoader::new()
            .with_page(
                "https://www.digi24.ro",
                r#"<h3><a href="/stiri/cutremur">Cutremur</a></h3>"#,
            )
            .with_page(
                "https://www.digi24.ro/stiri/cutremur",
                "<h1>\n  Cutremur\n  puternic în Vrancea\n</h1><figure><img src=\"/c.jpg\"></figure>",
            ),
    );
    let ingest = IngestionPipeline::new(
        store.clone(),
        loader,
        registry.sources,
        LabelClassifier::builtin(),
        IngestOptions::default(),
    );
    let summary = ingest.run_once().await.unwrap();
    assert_eq!(
        summary.sources["digi24.ro"].inserted[0].text,
        "Cutremur puternic în Vrancea"
    );

    let trends = pipeline(
        &store,
        keywords(&["cutremur"]),
        MatchPolicy::UnorderedTokens,
        MatchMode::Single,
    )
    .run_once()
    .await
    .unwrap();
    assert_eq!(trends.keywords, vec!["cutremur".to_string()]);
}
