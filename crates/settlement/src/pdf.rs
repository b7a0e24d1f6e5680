//! Invoice/gift-card PDF rendering collaborator
//!
//! Rendering is consumed as a function: structured data in, PDF bytes out.
//! The production implementation talks to the render service over HTTP.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::DeliveryConfig;
use crate::error::{SettlementError, SettlementResult};

/// Data the render service needs for an invoice.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceData {
    pub payment_reference: String,
    pub invoice_number: String,
    pub customer_email: String,
    pub product_title: String,
    pub amount_ore: i64,
    pub currency: String,
}

/// Data the render service needs for a gift-card PDF.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftCardData {
    pub code: String,
    pub amount_ore: i64,
    pub currency: String,
    pub recipient_email: Option<String>,
}

#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    async fn render_invoice(&self, invoice: &InvoiceData) -> SettlementResult<Vec<u8>>;

    async fn render_gift_card(&self, gift_card: &GiftCardData) -> SettlementResult<Vec<u8>>;
}

/// HTTP client for the PDF render service.
#[derive(Clone)]
pub struct PdfServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl PdfServiceClient {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.pdf_service_url.clone(),
        }
    }

    async fn render<T: Serialize + Sync>(&self, path: &str, data: &T) -> SettlementResult<Vec<u8>> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SettlementError::Collaborator(format!(
                "render service returned HTTP {} for {path}",
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl InvoiceRenderer for PdfServiceClient {
    async fn render_invoice(&self, invoice: &InvoiceData) -> SettlementResult<Vec<u8>> {
        self.render("/render/invoice", invoice).await
    }

    async fn render_gift_card(&self, gift_card: &GiftCardData) -> SettlementResult<Vec<u8>> {
        self.render("/render/gift-card", gift_card).await
    }
}
