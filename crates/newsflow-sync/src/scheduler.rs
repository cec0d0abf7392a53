use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::ingest::IngestionPipeline;
use crate::trends::TrendPipeline;

type BoxedRun = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Wraps `run` so a tick arriving while the previous run is still going is
/// dropped instead of starting a second, overlapping run.
fn exclusive<F>(name: &'static str, run: F) -> impl FnMut() -> BoxedRun + Send + Sync + 'static
where
    F: Fn() -> BoxedRun + Send + Sync + 'static,
{
    let in_flight = Arc::new(Mutex::new(()));
    let run = Arc::new(run);
    move || -> BoxedRun {
        let in_flight = Arc::clone(&in_flight);
        let run = Arc::clone(&run);
        Box::pin(async move {
            let Ok(_running) = in_flight.try_lock() else {
                warn!(job = name, "previous run still in flight; tick skipped");
                return;
            };
            (*run)().await;
        })
    }
}

fn cron_job<F>(cron: &str, mut tick: F) -> Result<Job>
where
    F: FnMut() -> BoxedRun + Send + Sync + 'static,
{
    Job::new_async(cron, move |_uuid, _scheduler| tick())
        .with_context(|| format!("creating scheduler job for cron {cron}"))
}

/// Registers the ingestion and trend jobs. The scheduler is returned unstarted.
pub async fn build_scheduler(
    ingest_cron: &str,
    trends_cron: &str,
    ingest: Arc<IngestionPipeline>,
    trends: Arc<TrendPipeline>,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let ingest_tick = exclusive("ingest", move || -> BoxedRun {
        let pipeline = Arc::clone(&ingest);
        Box::pin(async move {
            match pipeline.run_once().await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    inserted = summary.inserted_total(),
                    "scheduled ingest finished"
                ),
                Err(err) => error!(error = ?err, "scheduled ingest failed"),
            }
        })
    });
    sched
        .add(cron_job(ingest_cron, ingest_tick)?)
        .await
        .context("adding ingest job")?;

    let trends_tick = exclusive("trends", move || -> BoxedRun {
        let pipeline = Arc::clone(&trends);
        Box::pin(async move {
            match pipeline.run_once().await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    matched = summary.keywords.len(),
                    "scheduled trend run finished"
                ),
                Err(err) => error!(error = ?err, "scheduled trend run failed"),
            }
        })
    });
    sched
        .add(cron_job(trends_cron, trends_tick)?)
        .await
        .context("adding trends job")?;

    Ok(sched)
}
