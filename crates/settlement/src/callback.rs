//! Provider callback (webhook) handling
//!
//! The callback endpoint is reachable from the public internet, so the
//! payload is validated against the provider's schema and its amount is only
//! compared, never adopted: the authoritative amount is the one recorded at
//! request-creation time.
//!
//! The provider can deliver the callback before the local record's insert is
//! visible. The lookup therefore retries on a short fixed interval; a
//! reference still unknown afterwards is surfaced as not-found and the
//! reconcile sweep remains the safety net.

use serde::Deserialize;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::error::{SettlementError, SettlementResult};
use crate::payment::{PaymentStatus, StatusSource, TransitionOutcome};
use crate::validate;
use crate::SettlementService;

const LOOKUP_RETRY_DELAY_MS: u64 = 200;
const LOOKUP_RETRY_ATTEMPTS: usize = 5;

/// Status notification pushed by the provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub id: Option<String>,
    pub payee_payment_reference: String,
    pub payment_reference: Option<String>,
    pub callback_url: Option<String>,
    pub payer_alias: Option<String>,
    pub payee_alias: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub message: Option<String>,
    pub status: String,
    pub date_created: Option<String>,
    pub date_paid: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl SettlementService {
    /// Apply a provider callback to the payment record.
    ///
    /// The HTTP layer acknowledges receipt once the payload parses,
    /// regardless of what this returns; errors here are for logging and
    /// operator follow-up, not for provider-side retries.
    pub async fn handle_callback(
        &self,
        payload: &CallbackPayload,
    ) -> SettlementResult<TransitionOutcome> {
        let reference = payload.payee_payment_reference.as_str();
        validate::validate_reference(reference)?;

        let status = PaymentStatus::parse(&payload.status).ok_or_else(|| {
            SettlementError::Validation(format!(
                "callback carried unknown status '{}'",
                payload.status
            ))
        })?;

        let record = Retry::spawn(
            FixedInterval::from_millis(LOOKUP_RETRY_DELAY_MS).take(LOOKUP_RETRY_ATTEMPTS),
            || async {
                self.store
                    .find_by_reference(reference)
                    .await?
                    .ok_or_else(|| {
                        SettlementError::NotFound(format!(
                            "payment '{reference}' not found for callback"
                        ))
                    })
            },
        )
        .await?;

        let callback_amount_ore = validate::parse_amount(payload.amount);
        if callback_amount_ore != record.amount_ore || payload.currency != record.currency {
            tracing::warn!(
                reference = %reference,
                recorded_amount_ore = record.amount_ore,
                callback_amount_ore = callback_amount_ore,
                recorded_currency = %record.currency,
                callback_currency = %payload.currency,
                "Callback amount differs from recorded amount; keeping recorded value"
            );
        }

        if let (PaymentStatus::Error, Some(code)) = (status, payload.error_code.as_deref()) {
            tracing::warn!(
                reference = %reference,
                error_code = code,
                error_message = payload.error_message.as_deref().unwrap_or(""),
                "Provider reported payment error"
            );
        }

        let outcome = self
            .store
            .transition(reference, status, StatusSource::Callback)
            .await?;

        // The guard makes this safe to run on duplicate deliveries too: a
        // repeated PAID callback finds the fulfillment already claimed.
        self.fulfill(reference).await?;

        // Settled status supersedes whatever the UI poller may have cached.
        if let Some(refreshed) = self.store.find_by_reference(reference).await? {
            self.cache.put(reference, refreshed.status).await;
        }

        Ok(outcome)
    }
}
