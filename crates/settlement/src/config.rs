//! Provider and collaborator configuration
//!
//! Configuration is read once at process start and passed into the services
//! by the binaries. Nothing in this crate reads the environment after
//! construction.

use crate::error::{SettlementError, SettlementResult};

/// Which certificate topology to use towards the provider.
///
/// The production API chains to a public CA and is verified against the
/// system trust store; the test (MSS) API uses a private CA that has to be
/// supplied explicitly. See `transport` for why this asymmetry is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEnvironment {
    Production,
    Test,
}

impl ProviderEnvironment {
    fn from_env_value(value: &str) -> SettlementResult<Self> {
        match value {
            "production" => Ok(ProviderEnvironment::Production),
            "test" => Ok(ProviderEnvironment::Test),
            other => Err(SettlementError::Validation(format!(
                "unknown PROVIDER_ENV '{other}' (expected 'production' or 'test')"
            ))),
        }
    }
}

/// Connection settings for the payment provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider API, e.g. `https://cpc.getswish.net/swish-cpcapi/api/v1`.
    pub base_url: String,
    /// Merchant alias payments are addressed to.
    pub payee_alias: String,
    /// Public URL the provider delivers callbacks to.
    pub callback_url: String,
    /// PEM file with the client certificate chain.
    pub cert_path: String,
    /// PEM file with the client private key.
    pub key_path: String,
    /// PEM file with the test-environment CA bundle. Ignored in production.
    pub ca_path: Option<String>,
    pub environment: ProviderEnvironment,
}

impl ProviderConfig {
    pub fn from_env() -> SettlementResult<Self> {
        Ok(Self {
            base_url: require("PROVIDER_BASE_URL")?,
            payee_alias: require("PROVIDER_PAYEE_ALIAS")?,
            callback_url: require("PROVIDER_CALLBACK_URL")?,
            cert_path: require("PROVIDER_CERT_PATH")?,
            key_path: require("PROVIDER_KEY_PATH")?,
            ca_path: std::env::var("PROVIDER_CA_PATH").ok(),
            environment: ProviderEnvironment::from_env_value(
                &std::env::var("PROVIDER_ENV").unwrap_or_else(|_| "test".to_string()),
            )?,
        })
    }
}

/// Settings for the delivery collaborators (mail, PDF rendering, storage).
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub mail_api_key: String,
    pub mail_from: String,
    pub pdf_service_url: String,
    pub storage_url: String,
    pub storage_token: String,
    pub storage_bucket: String,
}

impl DeliveryConfig {
    pub fn from_env() -> SettlementResult<Self> {
        Ok(Self {
            mail_api_key: require("RESEND_API_KEY")?,
            mail_from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "Ateljé Form <noreply@ateljeform.se>".to_string()),
            pdf_service_url: require("PDF_SERVICE_URL")?,
            storage_url: require("STORAGE_URL")?,
            storage_token: require("STORAGE_TOKEN")?,
            storage_bucket: std::env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "invoices".to_string()),
        })
    }
}

fn require(name: &str) -> SettlementResult<String> {
    std::env::var(name)
        .map_err(|_| SettlementError::Validation(format!("{name} must be set")))
}
