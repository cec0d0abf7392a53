use std::sync::Arc;

use anyhow::{Context, Result};
use newsflow_adapters::{
    BrowserlessPageLoader, ExtractOptions, HttpClientConfig, HttpFetcher, HttpPageLoader,
    PageLoader, SourceRegistry,
};
use newsflow_storage::{
    ArticleStore, MemoryArticleStore, PgArticleStore, RetryPolicy, StoreClient, StoreConfig,
};
use tokio_cron_scheduler::JobScheduler;
use tracing::{info, warn};

use crate::config::{CorpusLocation, NewsflowConfig};
use crate::ingest::{IngestOptions, IngestRunSummary, IngestionPipeline};
use crate::labels::LabelClassifier;
use crate::scheduler;
use crate::trends::{
    CorpusSource, HttpCorpusSource, PageTrendingSource, StoreCorpusSource, TrendMatcher,
    TrendPipeline, TrendRunSummary, TrendingSource,
};

/// Process-wide handles shared by both pipelines: one store, one page loader,
/// one HTTP client. Open once at startup and call [`Runtime::shutdown`] on exit.
pub struct Runtime {
    config: NewsflowConfig,
    store: Arc<dyn ArticleStore>,
    client: Option<StoreClient>,
    loader: Arc<dyn PageLoader>,
    http: HttpFetcher,
}

impl Runtime {
    pub async fn connect(config: NewsflowConfig) -> Result<Self> {
        let (store, client): (Arc<dyn ArticleStore>, Option<StoreClient>) = if config.uses_memory_store() {
            warn!("DATABASE_URL is memory://; nothing will be persisted");
            let store: Arc<dyn ArticleStore> = Arc::new(MemoryArticleStore::new());
            (store, None)
        } else {
            let store_config = StoreConfig {
                database_url: config.database_url.clone(),
                max_connections: config.db_max_connections,
                acquire_timeout: config.db_acquire_timeout,
                retry: RetryPolicy {
                    max_attempts: config.store_retries.max(1),
                    delay: config.store_retry_delay,
                },
            };
            let client = StoreClient::connect(&store_config)
                .await
                .context("connecting to the article store")?;
            let store: Arc<dyn ArticleStore> = Arc::new(PgArticleStore::new(client.clone()));
            (store, Some(client))
        };

        let http = HttpFetcher::new(HttpClientConfig {
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })
        .context("building http client")?;

        let loader: Arc<dyn PageLoader> = match &config.browserless_url {
            Some(base) => {
                info!(%base, "rendering pages through browserless");
                Arc::new(BrowserlessPageLoader::new(
                    http.client().clone(),
                    base.clone(),
                    config.browserless_token.clone(),
                ))
            }
            None => Arc::new(HttpPageLoader::new(http.clone())),
        };

        Ok(Self {
            config,
            store,
            client,
            loader,
            http,
        })
    }

    pub fn config(&self) -> &NewsflowConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn ArticleStore> {
        Arc::clone(&self.store)
    }

    pub fn ingestion_pipeline(&self) -> Result<IngestionPipeline> {
        let registry = SourceRegistry::load(&self.config.sources_path)
            .with_context(|| format!("loading {}", self.config.sources_path.display()))?;
        let classifier = match &self.config.label_rules_path {
            Some(path) => LabelClassifier::from_yaml_file(path)?,
            None => LabelClassifier::builtin(),
        };
        let options = IngestOptions {
            retention: self.config.retention(),
            listing_timeout: self.config.listing_timeout,
            extract: ExtractOptions {
                navigation_timeout: self.config.detail_timeout,
                title_timeout: self.config.title_wait,
                concurrency: self.config.detail_concurrency.max(1),
            },
        };
        Ok(IngestionPipeline::new(
            Arc::clone(&self.store),
            Arc::clone(&self.loader),
            registry.sources,
            classifier,
            options,
        ))
    }

    pub fn trend_pipeline(&self) -> TrendPipeline {
        let trending: Arc<dyn TrendingSource> = Arc::new(PageTrendingSource::new(
            Arc::clone(&self.loader),
            self.config.trends_url.clone(),
            self.config.trends_selector.clone(),
            self.config.listing_timeout,
        ));
        self.trend_pipeline_with(trending)
    }

    /// Same as [`Runtime::trend_pipeline`] but with the keyword source supplied.
    pub fn trend_pipeline_with(&self, trending: Arc<dyn TrendingSource>) -> TrendPipeline {
        let corpus: Arc<dyn CorpusSource> = match &self.config.corpus {
            CorpusLocation::Http(url) => Arc::new(HttpCorpusSource::new(
                self.http.client().clone(),
                url.clone(),
                self.config.listing_timeout,
            )),
            CorpusLocation::Store => Arc::new(StoreCorpusSource::new(
                Arc::clone(&self.store),
                self.config.corpus_limit,
            )),
        };
        TrendPipeline::new(
            trending,
            corpus,
            Arc::clone(&self.store),
            TrendMatcher::new(self.config.trend_policy, self.config.trend_mode),
        )
    }

    pub async fn migrate(&self) -> Result<()> {
        match &self.client {
            Some(client) => client.migrate().await.context("applying migrations"),
            None => {
                info!("in-memory store needs no migrations");
                Ok(())
            }
        }
    }

    /// Cron jobs for both pipelines, unstarted.
    pub async fn build_scheduler(&self) -> Result<JobScheduler> {
        scheduler::build_scheduler(
            &self.config.ingest_cron,
            &self.config.trends_cron,
            Arc::new(self.ingestion_pipeline()?),
            Arc::new(self.trend_pipeline()),
        )
        .await
    }

    pub async fn shutdown(&self) {
        if let Some(client) = &self.client {
            client.close().await;
        }
    }
}

pub async fn run_ingest_once_from_env() -> Result<IngestRunSummary> {
    let runtime = Runtime::connect(NewsflowConfig::from_env()?).await?;
    let result = match runtime.ingestion_pipeline() {
        Ok(pipeline) => pipeline.run_once().await,
        Err(err) => Err(err),
    };
    runtime.shutdown().await;
    result
}

pub async fn run_trends_once_from_env() -> Result<TrendRunSummary> {
    let runtime = Runtime::connect(NewsflowConfig::from_env()?).await?;
    let result = runtime.trend_pipeline().run_once().await;
    runtime.shutdown().await;
    result
}
