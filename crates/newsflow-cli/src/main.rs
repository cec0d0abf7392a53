use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use newsflow_adapters::SourceRegistry;
use newsflow_sync::trends::StaticTrendingSource;
use newsflow_sync::{NewsflowConfig, Runtime};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "newsflow")]
#[command(about = "News ingestion and trend correlation")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "NEWSFLOW_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rotate the archive and run every enabled source once.
    Ingest,
    /// Correlate trending keywords with the corpus once.
    Trends {
        /// Use these keywords instead of scraping the trends page.
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },
    /// Apply pending database migrations.
    Migrate,
    /// Run both pipelines on their cron schedules until interrupted.
    Schedule,
    /// Load and validate the source registry without touching the network.
    CheckSources {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,sqlx=warn"))
        .context("building log filter")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn check_sources(path: &Path) -> Result<()> {
    let registry =
        SourceRegistry::load(path).with_context(|| format!("loading {}", path.display()))?;
    for source in &registry.sources {
        let state = if source.enabled { "enabled" } else { "disabled" };
        println!("{:<28} {:<22} {state}", source.name, source.category);
    }
    println!(
        "{} sources, {} enabled",
        registry.sources.len(),
        registry.enabled().count()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;
    let config = NewsflowConfig::from_env()?;

    // Without a subcommand, NEWSFLOW_SCHEDULER_ENABLED decides between one pass and the daemon.
    let command = cli.command.unwrap_or(if config.scheduler_enabled {
        Commands::Schedule
    } else {
        Commands::Ingest
    });

    match command {
        Commands::CheckSources { path } => {
            check_sources(&path.unwrap_or(config.sources_path))?;
        }
        command => {
            let runtime = Runtime::connect(config).await?;
            let result = run(&runtime, command).await;
            runtime.shutdown().await;
            result?;
        }
    }

    Ok(())
}

async fn run(runtime: &Runtime, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest => {
            let summary = runtime.ingestion_pipeline()?.run_once().await?;
            print_json(&summary)?;
        }
        Commands::Trends { keywords } => {
            let pipeline = if keywords.is_empty() {
                runtime.trend_pipeline()
            } else {
                runtime.trend_pipeline_with(Arc::new(StaticTrendingSource(keywords)))
            };
            print_json(&pipeline.run_once().await?)?;
        }
        Commands::Migrate => {
            runtime.migrate().await?;
            println!("migrations applied");
        }
        Commands::Schedule => {
            let mut scheduler = runtime.build_scheduler().await?;
            scheduler.start().await.context("starting scheduler")?;
            info!(
                ingest = %runtime.config().ingest_cron,
                trends = %runtime.config().trends_cron,
                "scheduler running; ctrl-c to stop"
            );
            tokio::signal::ctrl_c()
                .await
                .context("waiting for ctrl-c")?;
            scheduler.shutdown().await.context("stopping scheduler")?;
        }
        Commands::CheckSources { path } => {
            check_sources(path.as_deref().unwrap_or(&runtime.config().sources_path))?;
        }
    }
    Ok(())
}
