//! Post-settlement fulfillment with exactly-once semantics
//!
//! Both the callback handler and the reconciliation poller can observe the
//! same settlement, sometimes within the same instant. The fulfillment claim
//! (a conditional insert on the payment reference) decides a single winner;
//! everyone else sees an already-claimed reference and backs off without
//! side effects.

use uuid::Uuid;

use crate::error::SettlementResult;
use crate::jobs::JobType;
use crate::payment::{PaymentStatus, ProductType};
use crate::processor::{InvoiceEmailJob, OrderConfirmationJob};
use crate::SettlementService;

impl SettlementService {
    /// Run the post-settlement sequence for a paid payment, at most once per
    /// reference. Safe to call from any path that observes settlement; a
    /// payment that is not `PAID` or is already fulfilled is a no-op.
    ///
    /// Returns the id of the enqueued invoice job when this call won the
    /// claim.
    pub async fn fulfill(&self, reference: &str) -> SettlementResult<Option<Uuid>> {
        let Some(record) = self.store.find_by_reference(reference).await? else {
            tracing::warn!(reference = %reference, "Fulfillment requested for unknown payment");
            return Ok(None);
        };

        if record.status != PaymentStatus::Paid {
            return Ok(None);
        }

        if !self.store.claim_fulfillment(reference).await? {
            tracing::debug!(reference = %reference, "Fulfillment already claimed");
            return Ok(None);
        }

        tracing::info!(reference = %reference, "Claimed fulfillment for settled payment");

        let (booking_id, gift_card_code) = match record.product_type {
            ProductType::GiftCard => {
                let gift_card = self
                    .catalog
                    .issue_gift_card(
                        reference,
                        record.amount_ore,
                        Some(record.customer_email.as_str()).filter(|e| !e.is_empty()),
                    )
                    .await?;
                (gift_card.id, Some(gift_card.code))
            }
            ProductType::Course | ProductType::ArtProduct => {
                let booking_id = self
                    .catalog
                    .create_booking(
                        reference,
                        record.product_type,
                        record.product_id.as_deref(),
                        &record.payer_contact,
                    )
                    .await?;
                (booking_id, None)
            }
        };

        self.store.record_booking(reference, booking_id).await?;

        let invoice_job = InvoiceEmailJob {
            payment_reference: record.reference.clone(),
            product_type: record.product_type,
            product_id: record.product_id.clone(),
            customer_email: record.customer_email.clone(),
            amount_ore: record.amount_ore,
            currency: record.currency.clone(),
            booking_id: Some(booking_id),
            gift_card_code,
            invoice_number: None,
        };
        let job = self
            .jobs
            .enqueue(JobType::InvoiceEmail, invoice_job.to_value()?)
            .await?;

        if record.product_type == ProductType::Course {
            let confirmation = OrderConfirmationJob {
                payment_reference: record.reference.clone(),
                booking_id: Some(booking_id),
                customer_email: record.customer_email.clone(),
                product_id: record.product_id.clone(),
            };
            self.jobs
                .enqueue(JobType::OrderConfirmation, confirmation.to_value()?)
                .await?;
        }

        self.store
            .record_fulfillment(reference, Some(booking_id), Some(job.id))
            .await?;

        tracing::info!(
            reference = %reference,
            booking_id = %booking_id,
            job_id = %job.id,
            "Post-settlement sequence complete"
        );

        Ok(Some(job.id))
    }
}
