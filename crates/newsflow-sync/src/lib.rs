//! Ingestion and trend-correlation orchestration.

pub mod config;
pub mod dedup;
pub mod ingest;
pub mod labels;
pub mod runtime;
pub mod scheduler;
pub mod trends;

pub use config::{CorpusLocation, NewsflowConfig};
pub use dedup::filter_new_links;
pub use ingest::{IngestOptions, IngestRunSummary, IngestionPipeline, SourceOutcome};
pub use labels::{format_label, LabelClassifier, LabelRule};
pub use runtime::{run_ingest_once_from_env, run_trends_once_from_env, Runtime};
pub use trends::{MatchMode, MatchPolicy, TrendMatcher, TrendPipeline, TrendRunSummary};

pub const CRATE_NAME: &str = "newsflow-sync";
