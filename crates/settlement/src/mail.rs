//! Outbound email collaborator
//!
//! Email transport is consumed as a function: recipient plus attachments in,
//! success or failure out. The production implementation posts to the Resend
//! HTTP API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;

use crate::config::DeliveryConfig;
use crate::error::{SettlementError, SettlementResult};

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<EmailAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> SettlementResult<()>;
}

/// Resend-backed mailer.
#[derive(Clone)]
pub struct ResendMailer {
    http: reqwest::Client,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct WireAttachment<'a> {
    filename: &'a str,
    content: String,
}

#[derive(Serialize)]
struct WireEmail<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<WireAttachment<'a>>,
}

impl ResendMailer {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.mail_api_key.clone(),
            from: config.mail_from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> SettlementResult<()> {
        let body = WireEmail {
            from: &self.from,
            to: vec![&email.to],
            subject: &email.subject,
            html: &email.html,
            attachments: email
                .attachments
                .iter()
                .map(|a| WireAttachment {
                    filename: &a.filename,
                    content: BASE64.encode(&a.content),
                })
                .collect(),
        };

        let response = self
            .http
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(SettlementError::Collaborator(format!(
                "mail API returned HTTP {status}: {detail}"
            )));
        }

        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "Email dispatched"
        );
        Ok(())
    }
}
