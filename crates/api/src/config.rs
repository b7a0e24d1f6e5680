//! API server configuration

use anyhow::Context;

/// Server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Direct (non-pooler) URL used for migrations when set.
    pub database_direct_url: Option<String>,
    pub bind_address: String,
    /// `local` disables the job trigger token requirement.
    pub app_env: String,
    /// Token protecting the job trigger endpoint outside local runs.
    pub job_trigger_token: Option<String>,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_direct_url: std::env::var("DATABASE_DIRECT_URL").ok(),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            app_env: std::env::var("APP_ENV").unwrap_or_else(|_| "local".to_string()),
            job_trigger_token: std::env::var("JOB_TRIGGER_TOKEN").ok(),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}
