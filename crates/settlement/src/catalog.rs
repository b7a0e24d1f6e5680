//! Booking and gift-card catalog collaborator
//!
//! The catalog owns bookings, courses, art products and gift cards; the
//! settlement core only creates bookings on settlement and reads product
//! details for invoicing. Rows are referenced by id, never embedded.

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{SettlementError, SettlementResult};
use crate::payment::ProductType;

#[derive(Debug, Clone)]
pub struct CourseDetails {
    pub title: String,
    pub starts_at: Option<OffsetDateTime>,
    pub location: Option<String>,
}

impl CourseDetails {
    /// Used when the course row cannot be fetched at job-processing time;
    /// the invoice still has to go out.
    pub fn fallback() -> Self {
        Self {
            title: "Kurs hos Ateljé Form".to_string(),
            starts_at: None,
            location: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtProductDetails {
    pub title: String,
    pub description: Option<String>,
}

impl ArtProductDetails {
    pub fn fallback() -> Self {
        Self {
            title: "Konstprodukt från Ateljé Form".to_string(),
            description: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GiftCardRecord {
    pub id: Uuid,
    pub code: String,
    pub amount_ore: i64,
    pub invoice_number: Option<String>,
    pub recipient_email: Option<String>,
}

/// Read/write interface to the catalog collaborator.
#[async_trait]
pub trait BookingCatalog: Send + Sync {
    /// Create a booking row for a settled payment; returns its id.
    async fn create_booking(
        &self,
        payment_reference: &str,
        product_type: ProductType,
        product_id: Option<&str>,
        customer_contact: &str,
    ) -> SettlementResult<Uuid>;

    /// Issue a gift card for a settled gift-card payment.
    async fn issue_gift_card(
        &self,
        payment_reference: &str,
        amount_ore: i64,
        recipient_email: Option<&str>,
    ) -> SettlementResult<GiftCardRecord>;

    async fn course_details(&self, course_id: &str) -> SettlementResult<CourseDetails>;

    async fn art_product_details(&self, product_id: &str) -> SettlementResult<ArtProductDetails>;

    async fn gift_card_by_reference(
        &self,
        payment_reference: &str,
    ) -> SettlementResult<Option<GiftCardRecord>>;

    async fn gift_card_by_code(&self, code: &str) -> SettlementResult<Option<GiftCardRecord>>;

    async fn gift_card_by_invoice_number(
        &self,
        invoice_number: &str,
    ) -> SettlementResult<Option<GiftCardRecord>>;
}

/// Postgres-backed catalog.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct GiftCardRow {
    id: Uuid,
    code: String,
    amount_ore: i64,
    invoice_number: Option<String>,
    recipient_email: Option<String>,
}

impl From<GiftCardRow> for GiftCardRecord {
    fn from(row: GiftCardRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            amount_ore: row.amount_ore,
            invoice_number: row.invoice_number,
            recipient_email: row.recipient_email,
        }
    }
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_id(raw: &str) -> SettlementResult<Uuid> {
        Uuid::parse_str(raw)
            .map_err(|_| SettlementError::Validation(format!("'{raw}' is not a valid product id")))
    }
}

const GIFT_CARD_COLUMNS: &str = "id, code, amount_ore, invoice_number, recipient_email";

#[async_trait]
impl BookingCatalog for PgCatalog {
    async fn create_booking(
        &self,
        payment_reference: &str,
        product_type: ProductType,
        product_id: Option<&str>,
        customer_contact: &str,
    ) -> SettlementResult<Uuid> {
        let (booking_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO bookings (payment_reference, product_type, product_id, customer_contact)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(payment_reference)
        .bind(product_type.as_str())
        .bind(product_id)
        .bind(customer_contact)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            payment_reference = %payment_reference,
            booking_id = %booking_id,
            product_type = product_type.as_str(),
            "Booking created"
        );
        Ok(booking_id)
    }

    async fn issue_gift_card(
        &self,
        payment_reference: &str,
        amount_ore: i64,
        recipient_email: Option<&str>,
    ) -> SettlementResult<GiftCardRecord> {
        let code = format!("GC-{}", Uuid::new_v4().simple()).to_uppercase();
        let row: GiftCardRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO gift_cards (code, payment_reference, amount_ore, recipient_email)
            VALUES ($1, $2, $3, $4)
            RETURNING {GIFT_CARD_COLUMNS}
            "#
        ))
        .bind(&code)
        .bind(payment_reference)
        .bind(amount_ore)
        .bind(recipient_email)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            payment_reference = %payment_reference,
            code = %row.code,
            "Gift card issued"
        );
        Ok(row.into())
    }

    async fn course_details(&self, course_id: &str) -> SettlementResult<CourseDetails> {
        let id = Self::parse_id(course_id)?;
        let row: Option<(String, Option<OffsetDateTime>, Option<String>)> =
            sqlx::query_as("SELECT title, starts_at, location FROM courses WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let (title, starts_at, location) = row.ok_or_else(|| {
            SettlementError::NotFound(format!("course '{course_id}' not found"))
        })?;
        Ok(CourseDetails {
            title,
            starts_at,
            location,
        })
    }

    async fn art_product_details(&self, product_id: &str) -> SettlementResult<ArtProductDetails> {
        let id = Self::parse_id(product_id)?;
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT title, description FROM art_products WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let (title, description) = row.ok_or_else(|| {
            SettlementError::NotFound(format!("art product '{product_id}' not found"))
        })?;
        Ok(ArtProductDetails { title, description })
    }

    async fn gift_card_by_reference(
        &self,
        payment_reference: &str,
    ) -> SettlementResult<Option<GiftCardRecord>> {
        let row: Option<GiftCardRow> = sqlx::query_as(&format!(
            "SELECT {GIFT_CARD_COLUMNS} FROM gift_cards WHERE payment_reference = $1"
        ))
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn gift_card_by_code(&self, code: &str) -> SettlementResult<Option<GiftCardRecord>> {
        let row: Option<GiftCardRow> = sqlx::query_as(&format!(
            "SELECT {GIFT_CARD_COLUMNS} FROM gift_cards WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn gift_card_by_invoice_number(
        &self,
        invoice_number: &str,
    ) -> SettlementResult<Option<GiftCardRecord>> {
        let row: Option<GiftCardRow> = sqlx::query_as(&format!(
            "SELECT {GIFT_CARD_COLUMNS} FROM gift_cards WHERE invoice_number = $1"
        ))
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}
