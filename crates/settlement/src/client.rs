//! Payment request client
//!
//! Speaks the provider's payment-request API over the certificate-bound
//! transport. Request construction is separated from record keeping: this
//! client never touches the payment store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::payment::PaymentStatus;
use crate::transport;
use crate::validate;

/// A validated, normalized payment-initiation request.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub reference: String,
    pub amount_ore: i64,
    pub currency: String,
    /// Payer's phone number in international format.
    pub payer_alias: String,
    pub message: String,
}

/// The provider's view of a payment, as returned by the status query.
#[derive(Debug, Clone)]
pub struct ProviderPaymentDoc {
    pub id: String,
    pub status: PaymentStatus,
    pub amount_ore: i64,
    pub currency: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Outbound interface to the payment provider.
///
/// The production implementation is [`SwishClient`]; tests inject scripted
/// doubles.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Issue a payment request; returns the provider-assigned payment id.
    async fn create_payment(&self, request: &PaymentRequest) -> SettlementResult<String>;

    /// Query payment status directly by provider payment id.
    async fn fetch_payment(&self, provider_payment_id: &str)
        -> SettlementResult<ProviderPaymentDoc>;
}

/// HTTP client for the Swish payment-request API.
#[derive(Clone)]
pub struct SwishClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentBody<'a> {
    payee_payment_reference: &'a str,
    callback_url: &'a str,
    payee_alias: &'a str,
    payer_alias: &'a str,
    amount: String,
    currency: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderErrorBody {
    error_code: Option<String>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentDocWire {
    id: String,
    status: String,
    amount: f64,
    currency: String,
    error_code: Option<String>,
    error_message: Option<String>,
}

impl SwishClient {
    /// Build a client over the mutual-TLS transport. Fails fast on missing
    /// or unreadable certificate material.
    pub fn new(config: ProviderConfig) -> SettlementResult<Self> {
        let http = transport::build_client(&config)?;
        Ok(Self { http, config })
    }

    /// Build a client over a caller-supplied HTTP client. Used by tests that
    /// talk to a local mock server without certificates.
    pub fn with_http_client(http: reqwest::Client, config: ProviderConfig) -> Self {
        Self { http, config }
    }

    fn validate(request: &PaymentRequest) -> SettlementResult<()> {
        validate::validate_reference(&request.reference)?;
        validate::validate_amount_ore(request.amount_ore)?;
        validate::validate_message(&request.message)?;
        Ok(())
    }

    async fn provider_error(response: reqwest::Response) -> SettlementError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<Vec<ProviderErrorBody>>(&text) {
            Ok(errors) if !errors.is_empty() => SettlementError::Api {
                status,
                error_code: errors[0].error_code.clone(),
                message: errors[0]
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "provider rejected the request".to_string()),
            },
            _ => SettlementError::Api {
                status,
                error_code: None,
                message: if text.is_empty() {
                    format!("provider returned HTTP {status}")
                } else {
                    text
                },
            },
        }
    }
}

#[async_trait]
impl PaymentProvider for SwishClient {
    async fn create_payment(&self, request: &PaymentRequest) -> SettlementResult<String> {
        // Reject malformed input before any network traffic.
        Self::validate(request)?;

        let body = CreatePaymentBody {
            payee_payment_reference: &request.reference,
            callback_url: &self.config.callback_url,
            payee_alias: &self.config.payee_alias,
            payer_alias: &request.payer_alias,
            amount: validate::format_amount(request.amount_ore),
            currency: &request.currency,
            message: &request.message,
        };

        let url = format!("{}/paymentrequests", self.config.base_url);
        let response = self.http.post(&url).json(&body).send().await?;

        if response.status() != reqwest::StatusCode::CREATED {
            let err = Self::provider_error(response).await;
            tracing::warn!(
                reference = %request.reference,
                error = %err,
                "Provider rejected payment request"
            );
            return Err(err);
        }

        // The new resource's address comes back in the Location header; its
        // trailing segment is the provider payment id.
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| SettlementError::Api {
                status: 201,
                error_code: None,
                message: "201 response missing Location header".to_string(),
            })?;

        let provider_payment_id = location
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| SettlementError::Api {
                status: 201,
                error_code: None,
                message: format!("could not extract payment id from Location '{location}'"),
            })?
            .to_string();

        tracing::info!(
            reference = %request.reference,
            provider_payment_id = %provider_payment_id,
            "Payment request created"
        );

        Ok(provider_payment_id)
    }

    async fn fetch_payment(
        &self,
        provider_payment_id: &str,
    ) -> SettlementResult<ProviderPaymentDoc> {
        let url = format!(
            "{}/paymentrequests/{provider_payment_id}",
            self.config.base_url
        );
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::provider_error(response).await);
        }

        let wire: PaymentDocWire = response.json().await?;
        let status = PaymentStatus::parse(&wire.status).ok_or_else(|| {
            SettlementError::Validation(format!(
                "provider returned unknown status '{}'",
                wire.status
            ))
        })?;

        Ok(ProviderPaymentDoc {
            id: wire.id,
            status,
            amount_ore: validate::parse_amount(wire.amount),
            currency: wire.currency,
            error_code: wire.error_code,
            error_message: wire.error_message,
        })
    }
}
