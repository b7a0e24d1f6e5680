//! Background job queue
//!
//! A durable single-claim work queue. Jobs are claimed oldest-first by
//! atomically flipping `pending` to `processing`; the claim is the only
//! mutual-exclusion mechanism between concurrent processors. A job that
//! fails stays `failed` with its captured error: there is deliberately no
//! retry scheduler, re-submission is an operator action.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{SettlementError, SettlementResult};

/// The closed set of job types the processor dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    InvoiceEmail,
    OrderConfirmation,
    GiftCardDelivery,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::InvoiceEmail => "invoice_email",
            JobType::OrderConfirmation => "order_confirmation",
            JobType::GiftCardDelivery => "gift_card_delivery",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "invoice_email" => Some(JobType::InvoiceEmail),
            "order_confirmation" => Some(JobType::OrderConfirmation),
            "gift_card_delivery" => Some(JobType::GiftCardDelivery),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A queued unit of post-settlement work.
///
/// `job_type` stays a raw string here so that an unrecognized type reaches
/// the processor and is marked failed there instead of being dropped at the
/// storage layer.
#[derive(Debug, Clone)]
pub struct BackgroundJob {
    pub id: Uuid,
    pub job_type: String,
    pub job_data: serde_json::Value,
    pub status: JobStatus,
    pub result_success: Option<bool>,
    pub result_error: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Durable storage for background jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn enqueue(
        &self,
        job_type: JobType,
        job_data: serde_json::Value,
    ) -> SettlementResult<BackgroundJob>;

    /// Atomically claim the oldest pending job, flipping it to `processing`.
    /// Exactly one of N concurrent claimers gets any given job.
    async fn claim_next(&self) -> SettlementResult<Option<BackgroundJob>>;

    async fn complete(&self, id: Uuid) -> SettlementResult<()>;

    async fn fail(&self, id: Uuid, error: &str) -> SettlementResult<()>;

    async fn find(&self, id: Uuid) -> SettlementResult<Option<BackgroundJob>>;

    /// Delete completed jobs older than the cutoff. Failed jobs are kept for
    /// operator inspection.
    async fn purge_completed(&self, older_than: Duration) -> SettlementResult<u64>;
}

/// Postgres-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    job_data: serde_json::Value,
    status: String,
    result_success: Option<bool>,
    result_error: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

const JOB_COLUMNS: &str =
    "id, job_type, job_data, status, result_success, result_error, created_at, updated_at";

impl JobRow {
    fn into_job(self) -> SettlementResult<BackgroundJob> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| {
            SettlementError::Collaborator(format!(
                "job {} has corrupt status '{}'",
                self.id, self.status
            ))
        })?;
        Ok(BackgroundJob {
            id: self.id,
            job_type: self.job_type,
            job_data: self.job_data,
            status,
            result_success: self.result_success,
            result_error: self.result_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(
        &self,
        job_type: JobType,
        job_data: serde_json::Value,
    ) -> SettlementResult<BackgroundJob> {
        let row: JobRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO background_jobs (job_type, job_data)
            VALUES ($1, $2)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_type.as_str())
        .bind(job_data)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(job_id = %row.id, job_type = %row.job_type, "Background job enqueued");
        row.into_job()
    }

    async fn claim_next(&self) -> SettlementResult<Option<BackgroundJob>> {
        // Single-row claim: lock the oldest pending job, skip rows another
        // processor holds, flip it to processing in the same transaction.
        let mut tx = self.pool.begin().await?;

        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM background_jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE background_jobs SET status = 'processing', updated_at = NOW() WHERE id = $1",
        )
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut job = row.into_job()?;
        job.status = JobStatus::Processing;
        Ok(Some(job))
    }

    async fn complete(&self, id: Uuid) -> SettlementResult<()> {
        sqlx::query(
            r#"
            UPDATE background_jobs
            SET status = 'completed', result_success = TRUE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> SettlementResult<()> {
        sqlx::query(
            r#"
            UPDATE background_jobs
            SET status = 'failed', result_success = FALSE, result_error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> SettlementResult<Option<BackgroundJob>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM background_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn purge_completed(&self, older_than: Duration) -> SettlementResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM background_jobs
            WHERE status = 'completed'
              AND updated_at < NOW() - ($1 || ' seconds')::INTERVAL
            "#,
        )
        .bind(older_than.as_secs() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
