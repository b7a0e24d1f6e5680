//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use atelje_settlement::{
    BucketStore, DeliveryConfig, JobProcessor, PdfServiceClient, ProviderConfig, ResendMailer,
    SettlementService,
};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub settlement: Arc<SettlementService>,
    /// Processor backing the job trigger endpoint.
    pub processor: Arc<JobProcessor>,
}

impl AppState {
    /// Wire the settlement service and job processor. Fails fast when the
    /// provider certificate material is missing or unreadable.
    pub fn new(
        pool: PgPool,
        config: Config,
        provider_config: ProviderConfig,
        delivery_config: DeliveryConfig,
    ) -> anyhow::Result<Self> {
        let settlement = Arc::new(SettlementService::with_postgres(
            pool.clone(),
            provider_config,
        )?);
        tracing::info!("Settlement service initialized");

        let processor = Arc::new(JobProcessor::new(
            settlement.jobs.clone(),
            settlement.catalog.clone(),
            Arc::new(PdfServiceClient::from_config(&delivery_config)),
            Arc::new(ResendMailer::from_config(&delivery_config)),
            Arc::new(BucketStore::from_config(&delivery_config)),
        ));
        tracing::info!("Job processor initialized");

        Ok(Self {
            pool,
            config,
            settlement,
            processor,
        })
    }
}
