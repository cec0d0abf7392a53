use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use newsflow_adapters::{discover_links, extract_articles, ExtractOptions, PageLoader, SourceProfile};
use newsflow_core::NewArticle;
use newsflow_storage::{ArticleStore, InsertOutcome, RotationReport};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::dedup::filter_new_links;
use crate::labels::LabelClassifier;

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Active rows older than this are moved to the archive at the start of a run.
    pub retention: chrono::Duration,
    pub listing_timeout: Duration,
    pub extract: ExtractOptions,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            retention: chrono::Duration::hours(24),
            listing_timeout: Duration::from_secs(60),
            extract: ExtractOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceOutcome {
    pub discovered: usize,
    pub new_links: usize,
    pub extracted: usize,
    pub inserted: Vec<NewArticle>,
    pub skipped_existing: usize,
    pub failed_inserts: usize,
    pub navigation_failed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rotation: RotationReport,
    pub sources: BTreeMap<String, SourceOutcome>,
}

impl IngestRunSummary {
    pub fn inserted_total(&self) -> usize {
        self.sources.values().map(|s| s.inserted.len()).sum()
    }
}

/// One ingestion pass: rotate the archive, then for every enabled source
/// discover, dedup, extract, classify and insert. Sources run one after the
/// other; only detail extraction is concurrent.
pub struct IngestionPipeline {
    store: Arc<dyn ArticleStore>,
    loader: Arc<dyn PageLoader>,
    sources: Vec<SourceProfile>,
    classifier: LabelClassifier,
    options: IngestOptions,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        loader: Arc<dyn PageLoader>,
        sources: Vec<SourceProfile>,
        classifier: LabelClassifier,
        options: IngestOptions,
    ) -> Self {
        Self {
            store,
            loader,
            sources,
            classifier,
            options,
        }
    }

    pub fn sources(&self) -> &[SourceProfile] {
        &self.sources
    }

    pub async fn run_once(&self) -> Result<IngestRunSummary> {
        self.run_at(Utc::now()).await
    }

    /// Runs with `now` as the rotation reference time.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<IngestRunSummary> {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id, now)
            .instrument(info_span!("ingest_run", %run_id))
            .await
    }

    async fn run_inner(&self, run_id: Uuid, now: DateTime<Utc>) -> Result<IngestRunSummary> {
        let started_at = Utc::now();
        let cutoff = now
            .checked_sub_signed(self.options.retention)
            .context("retention window reaches past the earliest representable time")?;
        let rotation = self
            .store
            .rotate_archive(cutoff)
            .await
            .context("rotating stale articles into the archive")?;

        let mut sources = BTreeMap::new();
        for profile in self.sources.iter().filter(|s| s.enabled) {
            let outcome = self
                .run_source(profile)
                .instrument(info_span!("source", source = %profile.name))
                .await
                .with_context(|| format!("ingesting {}", profile.name))?;
            sources.insert(profile.name.clone(), outcome);
        }

        let summary = IngestRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            rotation,
            sources,
        };
        info!(
            sources = summary.sources.len(),
            inserted = summary.inserted_total(),
            archived = rotation.archived,
            "ingest run finished"
        );
        Ok(summary)
    }

    async fn run_source(&self, profile: &SourceProfile) -> Result<SourceOutcome> {
        let mut outcome = SourceOutcome::default();

        let links = match discover_links(self.loader.as_ref(), profile, self.options.listing_timeout).await {
            Ok(links) => links,
            Err(err) => {
                warn!(error = %err, "listing page unavailable; source skipped for this run");
                outcome.navigation_failed = true;
                return Ok(outcome);
            }
        };
        outcome.discovered = links.len();

        let fresh = filter_new_links(self.store.as_ref(), links, &profile.category)
            .await
            .context("checking candidate links against the store")?;
        outcome.new_links = fresh.len();

        let drafts = extract_articles(self.loader.as_ref(), profile, &fresh, &self.options.extract).await;
        outcome.extracted = drafts.len();

        for draft in drafts {
            let label = self.classifier.classify(&draft.raw_label);
            let article = NewArticle::from_draft(draft, label);
            match self.store.insert_article(&article, Utc::now()).await {
                Ok(InsertOutcome::Inserted { id }) => {
                    debug!(id, href = %article.href, label = %article.label, "article stored");
                    outcome.inserted.push(article);
                }
                Ok(InsertOutcome::AlreadyExists) => {
                    debug!(href = %article.href, "already stored");
                    outcome.skipped_existing += 1;
                }
                Err(err) if err.is_retry_exhausted() => {
                    warn!(href = %article.href, error = %err, "insert gave up; article skipped");
                    outcome.failed_inserts += 1;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("inserting {}", article.href));
                }
            }
        }

        info!(
            discovered = outcome.discovered,
            new = outcome.new_links,
            extracted = outcome.extracted,
            inserted = outcome.inserted.len(),
            "source finished"
        );
        Ok(outcome)
    }
}
