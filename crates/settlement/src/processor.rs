//! Background job processor
//!
//! Claims one pending job at a time and dispatches to a type-specific
//! handler. Dispatch is a closed set: an unrecognized job type is a terminal
//! failure for that job, never a silent drop. A handler error marks the job
//! `failed` with the captured message and leaves the settled payment record
//! untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::catalog::{ArtProductDetails, BookingCatalog, CourseDetails, GiftCardRecord};
use crate::error::{SettlementError, SettlementResult};
use crate::jobs::{BackgroundJob, JobStore, JobType};
use crate::mail::{EmailAttachment, Mailer, OutgoingEmail};
use crate::payment::ProductType;
use crate::pdf::{GiftCardData, InvoiceData, InvoiceRenderer};
use crate::validate;

/// Payload of an `invoice_email` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceEmailJob {
    pub payment_reference: String,
    pub product_type: ProductType,
    pub product_id: Option<String>,
    pub customer_email: String,
    pub amount_ore: i64,
    pub currency: String,
    pub booking_id: Option<Uuid>,
    pub gift_card_code: Option<String>,
    pub invoice_number: Option<String>,
}

/// Payload of an `order_confirmation` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmationJob {
    pub payment_reference: String,
    pub booking_id: Option<Uuid>,
    pub customer_email: String,
    pub product_id: Option<String>,
}

/// Payload of a `gift_card_delivery` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCardDeliveryJob {
    pub payment_reference: String,
    pub recipient_email: String,
    pub gift_card_code: Option<String>,
    pub invoice_number: Option<String>,
}

macro_rules! job_payload {
    ($($ty:ty),+) => {$(
        impl $ty {
            pub fn to_value(&self) -> SettlementResult<serde_json::Value> {
                serde_json::to_value(self).map_err(|e| {
                    SettlementError::Collaborator(format!("failed to encode job data: {e}"))
                })
            }

            pub fn from_job(job: &BackgroundJob) -> SettlementResult<Self> {
                serde_json::from_value(job.job_data.clone()).map_err(|e| {
                    SettlementError::Validation(format!(
                        "job {} has malformed data: {e}",
                        job.id
                    ))
                })
            }
        }
    )+};
}

job_payload!(InvoiceEmailJob, OrderConfirmationJob, GiftCardDeliveryJob);

/// Outcome report for a processed job.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedJob {
    pub job_id: Uuid,
    pub job_type: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Claims and executes background jobs.
pub struct JobProcessor {
    jobs: Arc<dyn JobStore>,
    catalog: Arc<dyn BookingCatalog>,
    renderer: Arc<dyn InvoiceRenderer>,
    mailer: Arc<dyn Mailer>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl JobProcessor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn BookingCatalog>,
        renderer: Arc<dyn InvoiceRenderer>,
        mailer: Arc<dyn Mailer>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            jobs,
            catalog,
            renderer,
            mailer,
            artifacts,
        }
    }

    /// Claim and run the oldest pending job, if any. An empty queue is a
    /// normal outcome, not an error.
    pub async fn process_next(&self) -> SettlementResult<Option<ProcessedJob>> {
        let Some(job) = self.jobs.claim_next().await? else {
            return Ok(None);
        };

        tracing::info!(job_id = %job.id, job_type = %job.job_type, "Claimed background job");

        let result = self.dispatch(&job).await;
        let report = match result {
            Ok(()) => {
                self.jobs.complete(job.id).await?;
                tracing::info!(job_id = %job.id, job_type = %job.job_type, "Job completed");
                ProcessedJob {
                    job_id: job.id,
                    job_type: job.job_type,
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                self.jobs.fail(job.id, &message).await?;
                tracing::error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    error = %message,
                    "Job failed"
                );
                ProcessedJob {
                    job_id: job.id,
                    job_type: job.job_type,
                    success: false,
                    error: Some(message),
                }
            }
        };

        Ok(Some(report))
    }

    async fn dispatch(&self, job: &BackgroundJob) -> SettlementResult<()> {
        match JobType::parse(&job.job_type) {
            Some(JobType::InvoiceEmail) => self.handle_invoice_email(job).await,
            Some(JobType::OrderConfirmation) => self.handle_order_confirmation(job).await,
            Some(JobType::GiftCardDelivery) => self.handle_gift_card_delivery(job).await,
            None => Err(SettlementError::Validation(format!(
                "unrecognized job type '{}'",
                job.job_type
            ))),
        }
    }

    /// The invoice email: product details (with fallbacks), invoice PDF,
    /// best-effort storage upload, optional gift-card PDF, then dispatch.
    ///
    /// Failure policy mirrors what the money flow requires: the invoice PDF
    /// and the email itself are mandatory, everything around them degrades
    /// gracefully.
    async fn handle_invoice_email(&self, job: &BackgroundJob) -> SettlementResult<()> {
        let data = InvoiceEmailJob::from_job(job)?;
        let reference = data.payment_reference.as_str();

        let product_title = self.product_title(data.product_type, data.product_id.as_deref()).await;

        let invoice_number = data
            .invoice_number
            .clone()
            .unwrap_or_else(|| format!("INV-{reference}"));
        let invoice = InvoiceData {
            payment_reference: reference.to_string(),
            invoice_number,
            customer_email: data.customer_email.clone(),
            product_title,
            amount_ore: data.amount_ore,
            currency: data.currency.clone(),
        };

        let invoice_pdf = self.renderer.render_invoice(&invoice).await?;

        // Persist the invoice for later download; on storage failure keep
        // going with the in-memory bytes instead of failing the whole job.
        match self
            .artifacts
            .put_pdf(&format!("invoices/{reference}.pdf"), &invoice_pdf)
            .await
        {
            Ok(url) => tracing::info!(reference = %reference, url = %url, "Invoice PDF stored"),
            Err(e) => tracing::warn!(
                reference = %reference,
                error = %e,
                "Invoice PDF storage failed; continuing with in-memory copy"
            ),
        }

        let mut attachments = vec![EmailAttachment {
            filename: format!("faktura-{reference}.pdf"),
            content: invoice_pdf,
        }];

        if data.product_type == ProductType::GiftCard {
            match self.render_gift_card_attachment(&data).await {
                Ok(Some(attachment)) => attachments.push(attachment),
                Ok(None) => tracing::warn!(
                    reference = %reference,
                    "Gift card not found on any lookup key; sending invoice only"
                ),
                Err(e) => tracing::warn!(
                    reference = %reference,
                    error = %e,
                    "Gift card PDF failed; sending invoice only"
                ),
            }
        }

        let email = OutgoingEmail {
            to: data.customer_email.clone(),
            subject: format!("Kvitto på din betalning ({reference})"),
            html: format!(
                "<p>Tack för din betalning på {} {}.</p>\
                 <p>Kvitto och faktura hittar du bifogade i detta mejl.</p>",
                validate::format_amount(data.amount_ore),
                data.currency
            ),
            attachments,
        };

        self.mailer.send(&email).await
    }

    async fn handle_order_confirmation(&self, job: &BackgroundJob) -> SettlementResult<()> {
        let data = OrderConfirmationJob::from_job(job)?;

        let course = match data.product_id.as_deref() {
            Some(id) => self.catalog.course_details(id).await.unwrap_or_else(|e| {
                tracing::warn!(
                    reference = %data.payment_reference,
                    error = %e,
                    "Course lookup failed; using fallback details"
                );
                CourseDetails::fallback()
            }),
            None => CourseDetails::fallback(),
        };

        let when = course
            .starts_at
            .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
            .unwrap_or_else(|| "meddelas separat".to_string());

        let email = OutgoingEmail {
            to: data.customer_email.clone(),
            subject: format!("Bokningsbekräftelse: {}", course.title),
            html: format!(
                "<p>Din plats på <strong>{}</strong> är bokad.</p>\
                 <p>Start: {when}<br>Plats: {}</p>",
                course.title,
                course.location.as_deref().unwrap_or("Ateljé Form"),
            ),
            attachments: Vec::new(),
        };

        self.mailer.send(&email).await
    }

    async fn handle_gift_card_delivery(&self, job: &BackgroundJob) -> SettlementResult<()> {
        let data = GiftCardDeliveryJob::from_job(job)?;

        // Re-delivery without the gift card is meaningless, so here the
        // lookup and the PDF are both mandatory.
        let gift_card = self
            .locate_gift_card(
                &data.payment_reference,
                data.gift_card_code.as_deref(),
                data.invoice_number.as_deref(),
            )
            .await?
            .ok_or_else(|| {
                SettlementError::NotFound(format!(
                    "no gift card found for payment '{}'",
                    data.payment_reference
                ))
            })?;

        let pdf = self
            .renderer
            .render_gift_card(&GiftCardData {
                code: gift_card.code.clone(),
                amount_ore: gift_card.amount_ore,
                currency: "SEK".to_string(),
                recipient_email: Some(data.recipient_email.clone()),
            })
            .await?;

        let email = OutgoingEmail {
            to: data.recipient_email.clone(),
            subject: "Ditt presentkort från Ateljé Form".to_string(),
            html: "<p>Här kommer ditt presentkort. Koden står i bifogad PDF.</p>".to_string(),
            attachments: vec![EmailAttachment {
                filename: format!("presentkort-{}.pdf", gift_card.code),
                content: pdf,
            }],
        };

        self.mailer.send(&email).await
    }

    async fn render_gift_card_attachment(
        &self,
        data: &InvoiceEmailJob,
    ) -> SettlementResult<Option<EmailAttachment>> {
        let Some(gift_card) = self
            .locate_gift_card(
                &data.payment_reference,
                data.gift_card_code.as_deref(),
                data.invoice_number.as_deref(),
            )
            .await?
        else {
            return Ok(None);
        };

        let pdf = self
            .renderer
            .render_gift_card(&GiftCardData {
                code: gift_card.code.clone(),
                amount_ore: gift_card.amount_ore,
                currency: data.currency.clone(),
                recipient_email: gift_card.recipient_email.clone(),
            })
            .await?;

        Ok(Some(EmailAttachment {
            filename: format!("presentkort-{}.pdf", gift_card.code),
            content: pdf,
        }))
    }

    /// The gift-card record may not be indexed on every field yet at
    /// job-processing time; fall through reference, code and invoice number
    /// before giving up.
    async fn locate_gift_card(
        &self,
        payment_reference: &str,
        code: Option<&str>,
        invoice_number: Option<&str>,
    ) -> SettlementResult<Option<GiftCardRecord>> {
        if let Some(gift_card) = self.catalog.gift_card_by_reference(payment_reference).await? {
            return Ok(Some(gift_card));
        }
        if let Some(code) = code {
            if let Some(gift_card) = self.catalog.gift_card_by_code(code).await? {
                return Ok(Some(gift_card));
            }
        }
        if let Some(invoice_number) = invoice_number {
            if let Some(gift_card) = self
                .catalog
                .gift_card_by_invoice_number(invoice_number)
                .await?
            {
                return Ok(Some(gift_card));
            }
        }
        Ok(None)
    }

    async fn product_title(
        &self,
        product_type: ProductType,
        product_id: Option<&str>,
    ) -> String {
        match (product_type, product_id) {
            (ProductType::Course, Some(id)) => self
                .catalog
                .course_details(id)
                .await
                .map(|c| c.title)
                .unwrap_or_else(|e| {
                    tracing::warn!(course_id = id, error = %e, "Course lookup failed");
                    CourseDetails::fallback().title
                }),
            (ProductType::Course, None) => CourseDetails::fallback().title,
            (ProductType::ArtProduct, Some(id)) => self
                .catalog
                .art_product_details(id)
                .await
                .map(|p| p.title)
                .unwrap_or_else(|e| {
                    tracing::warn!(product_id = id, error = %e, "Art product lookup failed");
                    ArtProductDetails::fallback().title
                }),
            (ProductType::ArtProduct, None) => ArtProductDetails::fallback().title,
            (ProductType::GiftCard, _) => "Presentkort från Ateljé Form".to_string(),
        }
    }
}
