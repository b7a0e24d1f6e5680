// Settlement crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Payment settlement and reconciliation core
//!
//! Treats the payment provider as an untrusted, eventually-consistent
//! webhook source and reconciles it against client-driven polling, with
//! exactly-once fulfillment and a durable background job queue for the
//! side effects.
//!
//! ## Components
//!
//! - **Transport/Client**: mutual-TLS payment-request client
//! - **Store**: payment state machine, first terminal status wins
//! - **Callback**: provider webhook applied through the state machine
//! - **Reconcile**: bounded polling with forced-check escalation
//! - **Fulfillment**: idempotency-guarded post-settlement sequence
//! - **Jobs/Processor**: single-claim queue for PDF + email side effects

pub mod artifacts;
pub mod cache;
pub mod callback;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod fulfillment;
pub mod jobs;
pub mod mail;
pub mod payment;
pub mod pdf;
pub mod processor;
pub mod reconcile;
pub mod store;
pub mod transport;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;


// Artifacts
pub use artifacts::{ArtifactStore, BucketStore};

// Cache
pub use cache::StatusCache;

// Callback
pub use callback::CallbackPayload;

// Catalog
pub use catalog::{ArtProductDetails, BookingCatalog, CourseDetails, GiftCardRecord, PgCatalog};

// Client
pub use client::{PaymentProvider, PaymentRequest, ProviderPaymentDoc, SwishClient};

// Config
pub use config::{DeliveryConfig, ProviderConfig, ProviderEnvironment};

// Error
pub use error::{SettlementError, SettlementResult};

// Jobs
pub use jobs::{BackgroundJob, JobStatus, JobStore, JobType, PgJobStore};

// Mail
pub use mail::{EmailAttachment, Mailer, OutgoingEmail, ResendMailer};

// Payment
pub use payment::{
    AuditEntry, NewPayment, PaymentRecord, PaymentStatus, ProductType, StatusSource,
    TransitionOutcome,
};

// Pdf
pub use pdf::{GiftCardData, InvoiceData, InvoiceRenderer, PdfServiceClient};

// Processor
pub use processor::{
    GiftCardDeliveryJob, InvoiceEmailJob, JobProcessor, OrderConfirmationJob, ProcessedJob,
};

// Reconcile
pub use reconcile::{poll_until_settled, CheckDepth, PollOutcome, PollPlan, StatusProbe};

// Store
pub use store::{PaymentStore, PgPaymentStore};

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

/// Input for initiating a payment.
#[derive(Debug, Clone)]
pub struct NewPaymentInput {
    pub reference: String,
    pub amount_ore: i64,
    pub currency: String,
    pub product_type: ProductType,
    pub product_id: Option<String>,
    pub payer_phone: String,
    pub customer_email: String,
    pub message: String,
}

/// The settlement service: single entry point for payment creation, status
/// observation, callback handling, reconciliation and fulfillment.
#[derive(Clone)]
pub struct SettlementService {
    pub store: Arc<dyn PaymentStore>,
    pub provider: Arc<dyn PaymentProvider>,
    pub jobs: Arc<dyn JobStore>,
    pub catalog: Arc<dyn BookingCatalog>,
    pub cache: StatusCache,
}

/// Status reads are cached just below the default poll interval so every
/// poll attempt still observes a fresh value.
const STATUS_CACHE_TTL: Duration = Duration::from_secs(1);

impl SettlementService {
    /// Assemble the service from explicit collaborators.
    pub fn new(
        store: Arc<dyn PaymentStore>,
        provider: Arc<dyn PaymentProvider>,
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn BookingCatalog>,
    ) -> Self {
        Self {
            store,
            provider,
            jobs,
            catalog,
            cache: StatusCache::new(STATUS_CACHE_TTL),
        }
    }

    /// Production wiring: Postgres stores plus the mutual-TLS provider
    /// client. Fails fast when the certificate material is missing.
    pub fn with_postgres(pool: PgPool, provider_config: ProviderConfig) -> SettlementResult<Self> {
        let client = SwishClient::new(provider_config)?;
        Ok(Self::new(
            Arc::new(PgPaymentStore::new(pool.clone())),
            Arc::new(client),
            Arc::new(PgJobStore::new(pool.clone())),
            Arc::new(PgCatalog::new(pool)),
        ))
    }

    /// Validate, persist and issue a payment request.
    ///
    /// Validation happens before anything touches the network or the
    /// database. If the provider rejects the request after the record was
    /// persisted, the record is settled as `ERROR` and the provider error is
    /// returned to the caller.
    pub async fn create_payment(
        &self,
        input: NewPaymentInput,
    ) -> SettlementResult<PaymentRecord> {
        validate::validate_reference(&input.reference)?;
        validate::validate_amount_ore(input.amount_ore)?;
        validate::validate_message(&input.message)?;
        let payer_alias = validate::normalize_phone(&input.payer_phone)?;

        let mut record = self
            .store
            .insert(NewPayment {
                reference: input.reference.clone(),
                amount_ore: input.amount_ore,
                currency: input.currency.clone(),
                product_type: input.product_type,
                product_id: input.product_id.clone(),
                payer_contact: payer_alias.clone(),
                customer_email: input.customer_email.clone(),
                message: input.message.clone(),
            })
            .await?;

        let request = PaymentRequest {
            reference: input.reference.clone(),
            amount_ore: input.amount_ore,
            currency: input.currency,
            payer_alias,
            message: input.message,
        };

        match self.provider.create_payment(&request).await {
            Ok(provider_payment_id) => {
                self.store
                    .record_provider_id(&record.reference, &provider_payment_id)
                    .await?;
                self.cache
                    .put(&record.reference, PaymentStatus::Created)
                    .await;
                record.provider_payment_id = Some(provider_payment_id);
                Ok(record)
            }
            Err(e) => {
                if let Err(transition_err) = self
                    .store
                    .transition(&record.reference, PaymentStatus::Error, StatusSource::Request)
                    .await
                {
                    tracing::error!(
                        reference = %record.reference,
                        error = %transition_err,
                        "Failed to record ERROR status after provider rejection"
                    );
                }
                Err(e)
            }
        }
    }

    /// Cancel a payment before settlement. Goes through the state machine,
    /// so a payment that already settled keeps its terminal status and the
    /// contradiction is reported as a conflict.
    pub async fn cancel(&self, reference: &str) -> SettlementResult<TransitionOutcome> {
        let outcome = self
            .store
            .transition(reference, PaymentStatus::Cancelled, StatusSource::Request)
            .await?;
        if outcome == TransitionOutcome::Applied {
            self.cache.put(reference, PaymentStatus::Cancelled).await;
        }
        Ok(outcome)
    }
}
