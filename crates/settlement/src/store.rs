//! Payment record store
//!
//! The single authority for payment state transitions. All mutual exclusion
//! is expressed in SQL: the terminal transition is a conditional `UPDATE`
//! that only matches rows still in `CREATED`, and the fulfillment claim is an
//! `INSERT ... ON CONFLICT DO NOTHING RETURNING` that exactly one concurrent
//! caller can win.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{SettlementError, SettlementResult};
use crate::payment::{
    evaluate_transition, AuditEntry, NewPayment, PaymentRecord, PaymentStatus, ProductType,
    StatusSource, TransitionOutcome,
};

/// Durable storage for payment records and fulfillment markers.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, new: NewPayment) -> SettlementResult<PaymentRecord>;

    async fn find_by_reference(&self, reference: &str)
        -> SettlementResult<Option<PaymentRecord>>;

    async fn record_provider_id(
        &self,
        reference: &str,
        provider_payment_id: &str,
    ) -> SettlementResult<()>;

    /// Propose a status transition. Atomic: concurrent proposals for the
    /// same reference are totally ordered and the first terminal one wins.
    async fn transition(
        &self,
        reference: &str,
        proposed: PaymentStatus,
        source: StatusSource,
    ) -> SettlementResult<TransitionOutcome>;

    async fn record_booking(&self, reference: &str, booking_id: Uuid) -> SettlementResult<()>;

    /// Claim the right to fulfill a settled payment. Returns `true` for
    /// exactly one caller per reference, `false` for everyone else.
    async fn claim_fulfillment(&self, reference: &str) -> SettlementResult<bool>;

    async fn record_fulfillment(
        &self,
        reference: &str,
        booking_id: Option<Uuid>,
        job_id: Option<Uuid>,
    ) -> SettlementResult<()>;

    /// Payments still `CREATED` after `older_than`, oldest first. Input to
    /// the worker's reconcile sweep.
    async fn stale_created(
        &self,
        older_than: Duration,
        limit: i64,
    ) -> SettlementResult<Vec<PaymentRecord>>;
}

/// Postgres-backed payment store.
#[derive(Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    reference: String,
    provider_payment_id: Option<String>,
    status: String,
    amount_ore: i64,
    currency: String,
    product_type: String,
    product_id: Option<String>,
    payer_contact: String,
    customer_email: String,
    message: String,
    booking_id: Option<Uuid>,
    status_history: serde_json::Value,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

const PAYMENT_COLUMNS: &str = "id, reference, provider_payment_id, status, amount_ore, currency, \
     product_type, product_id, payer_contact, customer_email, message, booking_id, \
     status_history, created_at, updated_at";

impl PaymentRow {
    fn into_record(self) -> SettlementResult<PaymentRecord> {
        let status = PaymentStatus::parse(&self.status).ok_or_else(|| {
            SettlementError::Collaborator(format!(
                "payment {} has corrupt status '{}'",
                self.reference, self.status
            ))
        })?;
        let product_type = ProductType::parse(&self.product_type).ok_or_else(|| {
            SettlementError::Collaborator(format!(
                "payment {} has corrupt product type '{}'",
                self.reference, self.product_type
            ))
        })?;
        let history: Vec<AuditEntry> =
            serde_json::from_value(self.status_history).unwrap_or_default();

        Ok(PaymentRecord {
            id: self.id,
            reference: self.reference,
            provider_payment_id: self.provider_payment_id,
            status,
            amount_ore: self.amount_ore,
            currency: self.currency,
            product_type,
            product_id: self.product_id,
            payer_contact: self.payer_contact,
            customer_email: self.customer_email,
            message: self.message,
            booking_id: self.booking_id,
            history,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn audit_json(status: PaymentStatus, source: StatusSource) -> SettlementResult<serde_json::Value> {
        serde_json::to_value(AuditEntry {
            status,
            source,
            at: OffsetDateTime::now_utc(),
        })
        .map_err(|e| SettlementError::Collaborator(format!("failed to encode audit entry: {e}")))
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert(&self, new: NewPayment) -> SettlementResult<PaymentRecord> {
        let row: PaymentRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO payments
                (reference, amount_ore, currency, product_type, product_id,
                 payer_contact, customer_email, message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(&new.reference)
        .bind(new.amount_ore)
        .bind(&new.currency)
        .bind(new.product_type.as_str())
        .bind(&new.product_id)
        .bind(&new.payer_contact)
        .bind(&new.customer_email)
        .bind(&new.message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .and_then(|db| db.code())
                .is_some_and(|code| code == "23505")
            {
                SettlementError::Validation(format!(
                    "payment reference '{}' already exists",
                    new.reference
                ))
            } else {
                SettlementError::Database(e)
            }
        })?;

        row.into_record()
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> SettlementResult<Option<PaymentRecord>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRow::into_record).transpose()
    }

    async fn record_provider_id(
        &self,
        reference: &str,
        provider_payment_id: &str,
    ) -> SettlementResult<()> {
        sqlx::query(
            "UPDATE payments SET provider_payment_id = $2, updated_at = NOW() WHERE reference = $1",
        )
        .bind(reference)
        .bind(provider_payment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn transition(
        &self,
        reference: &str,
        proposed: PaymentStatus,
        source: StatusSource,
    ) -> SettlementResult<TransitionOutcome> {
        if !proposed.is_terminal() {
            // Re-observing CREATED never writes; just confirm the row exists.
            return match self.find_by_reference(reference).await? {
                Some(_) => Ok(TransitionOutcome::DuplicateNoop),
                None => Err(SettlementError::NotFound(format!(
                    "payment '{reference}' not found"
                ))),
            };
        }

        let entry = Self::audit_json(proposed, source)?;
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                updated_at = NOW(),
                status_history = status_history || $3::jsonb
            WHERE reference = $1 AND status = 'CREATED'
            "#,
        )
        .bind(reference)
        .bind(proposed.as_str())
        .bind(entry)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            tracing::info!(
                reference = %reference,
                status = %proposed,
                source = source.as_str(),
                "Payment settled"
            );
            return Ok(TransitionOutcome::Applied);
        }

        // The conditional update missed: either the row is gone or a
        // terminal status is already stored. Re-read and classify through
        // the pure transition rule.
        let stored: Option<(String,)> =
            sqlx::query_as("SELECT status FROM payments WHERE reference = $1")
                .bind(reference)
                .fetch_optional(&self.pool)
                .await?;

        let Some((stored,)) = stored else {
            return Err(SettlementError::NotFound(format!(
                "payment '{reference}' not found"
            )));
        };
        let stored = PaymentStatus::parse(&stored).ok_or_else(|| {
            SettlementError::Collaborator(format!(
                "payment {reference} has corrupt status '{stored}'"
            ))
        })?;

        let outcome = evaluate_transition(stored, proposed);
        if let TransitionOutcome::Conflict { stored, proposed } = outcome {
            tracing::error!(
                reference = %reference,
                stored = %stored,
                proposed = %proposed,
                source = source.as_str(),
                "Conflicting terminal status signals; keeping first-observed status"
            );
        } else {
            tracing::debug!(
                reference = %reference,
                status = %proposed,
                source = source.as_str(),
                "Duplicate terminal signal absorbed"
            );
        }
        Ok(outcome)
    }

    async fn record_booking(&self, reference: &str, booking_id: Uuid) -> SettlementResult<()> {
        sqlx::query("UPDATE payments SET booking_id = $2, updated_at = NOW() WHERE reference = $1")
            .bind(reference)
            .bind(booking_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim_fulfillment(&self, reference: &str) -> SettlementResult<bool> {
        let claimed: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_fulfillments (reference)
            VALUES ($1)
            ON CONFLICT (reference) DO NOTHING
            RETURNING reference
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed.is_some())
    }

    async fn record_fulfillment(
        &self,
        reference: &str,
        booking_id: Option<Uuid>,
        job_id: Option<Uuid>,
    ) -> SettlementResult<()> {
        sqlx::query(
            "UPDATE payment_fulfillments SET booking_id = $2, job_id = $3 WHERE reference = $1",
        )
        .bind(reference)
        .bind(booking_id)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stale_created(
        &self,
        older_than: Duration,
        limit: i64,
    ) -> SettlementResult<Vec<PaymentRecord>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE status = 'CREATED'
              AND created_at < NOW() - ($1 || ' seconds')::INTERVAL
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(older_than.as_secs() as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PaymentRow::into_record).collect()
    }
}
