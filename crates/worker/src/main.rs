//! Ateljé Form background worker
//!
//! Handles scheduled jobs:
//! - Background job queue drain (every minute)
//! - Reconcile sweep for payments stuck in CREATED (every 2 minutes)
//! - Purge of old completed jobs (daily at 3:00 AM UTC)

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use atelje_settlement::{
    BucketStore, DeliveryConfig, JobProcessor, JobStore, PaymentStore, PdfServiceClient,
    ProviderConfig, ResendMailer, SettlementService,
};

/// Max jobs drained per queue sweep.
const DRAIN_BATCH: usize = 20;

/// Payments younger than this are left to the UI poller before the sweep
/// starts asking the provider directly.
const RECONCILE_GRACE: Duration = Duration::from_secs(60);

const RECONCILE_BATCH: i64 = 50;

/// Completed jobs are purged after a week; failed jobs are kept.
const PURGE_AFTER: Duration = Duration::from_secs(7 * 24 * 3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Ateljé Form worker");

    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = atelje_shared::create_pool(&database_url).await?;

    let provider_config = ProviderConfig::from_env()?;
    let delivery_config = DeliveryConfig::from_env()?;

    let settlement = Arc::new(SettlementService::with_postgres(
        pool.clone(),
        provider_config,
    )?);
    let processor = Arc::new(JobProcessor::new(
        settlement.jobs.clone(),
        settlement.catalog.clone(),
        Arc::new(PdfServiceClient::from_config(&delivery_config)),
        Arc::new(ResendMailer::from_config(&delivery_config)),
        Arc::new(BucketStore::from_config(&delivery_config)),
    ));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Drain the background job queue (every minute)
    let drain_processor = processor.clone();
    scheduler
        .add(Job::new_async("0 * * * * *", move |_uuid, _l| {
            let processor = drain_processor.clone();
            Box::pin(async move {
                drain_queue(&processor).await;
            })
        })?)
        .await?;
    info!("Scheduled: job queue drain (every minute)");

    // Job 2: Reconcile payments stuck in CREATED (every 2 minutes)
    let sweep_settlement = settlement.clone();
    scheduler
        .add(Job::new_async("0 */2 * * * *", move |_uuid, _l| {
            let settlement = sweep_settlement.clone();
            Box::pin(async move {
                reconcile_sweep(&settlement).await;
            })
        })?)
        .await?;
    info!("Scheduled: reconcile sweep (every 2 minutes)");

    // Job 3: Purge old completed jobs (daily at 3:00 AM UTC)
    let purge_settlement = settlement.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let settlement = purge_settlement.clone();
            Box::pin(async move {
                match settlement.jobs.purge_completed(PURGE_AFTER).await {
                    Ok(purged) => info!(purged = purged, "Completed job purge done"),
                    Err(e) => error!(error = %e, "Completed job purge failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: completed job purge (daily at 3:00 AM UTC)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    // The scheduler runs jobs in background tasks; keep the main task alive.
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

/// Process pending jobs until the queue is empty or the batch cap is hit.
async fn drain_queue(processor: &JobProcessor) {
    let mut processed = 0usize;
    let mut failed = 0usize;

    for _ in 0..DRAIN_BATCH {
        match processor.process_next().await {
            Ok(Some(report)) => {
                processed += 1;
                if !report.success {
                    failed += 1;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Job queue drain aborted");
                break;
            }
        }
    }

    if processed > 0 {
        info!(processed = processed, failed = failed, "Job queue drained");
    }
}

/// Force-check payments that have been CREATED for too long. Covers
/// deployments the provider's callbacks never reach.
async fn reconcile_sweep(settlement: &SettlementService) {
    let stale = match settlement
        .store
        .stale_created(RECONCILE_GRACE, RECONCILE_BATCH)
        .await
    {
        Ok(stale) => stale,
        Err(e) => {
            error!(error = %e, "Reconcile sweep could not list stale payments");
            return;
        }
    };

    if stale.is_empty() {
        return;
    }

    info!(count = stale.len(), "Reconciling stale payments");

    let mut settled = 0usize;
    for payment in stale {
        match settlement.forced_check(&payment.reference).await {
            Ok(status) if status.is_terminal() => {
                settled += 1;
                info!(
                    reference = %payment.reference,
                    status = %status,
                    "Stale payment settled by sweep"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    reference = %payment.reference,
                    error = %e,
                    "Forced check failed during sweep"
                );
            }
        }
    }

    if settled > 0 {
        info!(settled = settled, "Reconcile sweep complete");
    }
}
