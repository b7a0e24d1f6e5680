//! Certificate-bound transport towards the payment provider
//!
//! All provider traffic goes over mutual TLS. Construction fails fast when
//! any of the certificate material is missing or unreadable: a misconfigured
//! certificate must never degrade into plaintext or skipped verification.
//!
//! The two environments verify the peer differently, and that asymmetry is
//! intentional: the production API presents a certificate chained to a public
//! CA (system trust store suffices), while the test API uses a private CA
//! that has to be supplied via `ca_path` and added as a trust anchor. Do not
//! "unify" the two paths.

use std::fs;

use reqwest::tls::Version;
use reqwest::{Certificate, Client, Identity};

use crate::config::{ProviderConfig, ProviderEnvironment};
use crate::error::{SettlementError, SettlementResult};

/// Build the mutually-authenticated HTTP client described by `config`.
pub fn build_client(config: &ProviderConfig) -> SettlementResult<Client> {
    let cert_pem = read_material(&config.cert_path, "client certificate")?;
    let key_pem = read_material(&config.key_path, "client key")?;

    let mut identity_pem = cert_pem;
    identity_pem.push(b'\n');
    identity_pem.extend_from_slice(&key_pem);

    let identity = Identity::from_pem(&identity_pem)
        .map_err(|e| SettlementError::Certificate(format!("invalid client identity: {e}")))?;

    let mut builder = Client::builder()
        .use_rustls_tls()
        .identity(identity)
        .min_tls_version(Version::TLS_1_2)
        .timeout(std::time::Duration::from_secs(10));

    if config.environment == ProviderEnvironment::Test {
        let ca_path = config.ca_path.as_deref().ok_or_else(|| {
            SettlementError::Certificate(
                "PROVIDER_CA_PATH is required in the test environment".to_string(),
            )
        })?;
        let ca_pem = read_material(ca_path, "test CA bundle")?;
        let ca = Certificate::from_pem(&ca_pem)
            .map_err(|e| SettlementError::Certificate(format!("invalid test CA bundle: {e}")))?;
        builder = builder.add_root_certificate(ca);
        tracing::info!(ca = %ca_path, "Provider transport using test CA trust anchor");
    }

    builder
        .build()
        .map_err(|e| SettlementError::Certificate(format!("failed to build TLS client: {e}")))
}

fn read_material(path: &str, what: &str) -> SettlementResult<Vec<u8>> {
    fs::read(path)
        .map_err(|e| SettlementError::Certificate(format!("{what} at '{path}' unreadable: {e}")))
}
