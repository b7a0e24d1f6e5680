//! Payment domain types and the settlement state machine
//!
//! A payment starts in `Created` and moves into exactly one terminal state.
//! The transition rule is pure and lives here so the store implementations
//! (SQL or in-memory) only have to make its outcome atomic, not re-derive it.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle state of a payment. Only `Created` is non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Created,
    Paid,
    Declined,
    Error,
    Cancelled,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Created)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Created => "CREATED",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Declined => "DECLINED",
            PaymentStatus::Error => "ERROR",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(PaymentStatus::Created),
            "PAID" => Some(PaymentStatus::Paid),
            "DECLINED" => Some(PaymentStatus::Declined),
            "ERROR" => Some(PaymentStatus::Error),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which code path observed a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusSource {
    Callback,
    Poll,
    ForcedCheck,
    /// Transition applied while issuing the payment request itself
    /// (validation/transport failure recorded as ERROR).
    Request,
}

impl StatusSource {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusSource::Callback => "callback",
            StatusSource::Poll => "poll",
            StatusSource::ForcedCheck => "forced-check",
            StatusSource::Request => "request",
        }
    }
}

/// Append-only audit entry recorded with every applied transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub status: PaymentStatus,
    pub source: StatusSource,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// What kind of product a payment settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Course,
    ArtProduct,
    GiftCard,
}

impl ProductType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Course => "course",
            ProductType::ArtProduct => "art_product",
            ProductType::GiftCard => "gift_card",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "course" => Some(ProductType::Course),
            "art_product" => Some(ProductType::ArtProduct),
            "gift_card" => Some(ProductType::GiftCard),
            _ => None,
        }
    }
}

/// A durable payment record.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub reference: String,
    pub provider_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub amount_ore: i64,
    pub currency: String,
    pub product_type: ProductType,
    pub product_id: Option<String>,
    pub payer_contact: String,
    pub customer_email: String,
    pub message: String,
    pub booking_id: Option<Uuid>,
    pub history: Vec<AuditEntry>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Input for persisting a freshly validated payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub reference: String,
    pub amount_ore: i64,
    pub currency: String,
    pub product_type: ProductType,
    pub product_id: Option<String>,
    pub payer_contact: String,
    pub customer_email: String,
    pub message: String,
}

/// Result of proposing a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The proposed status was written.
    Applied,
    /// The proposed status matches what is stored (or is a stale
    /// non-terminal observation); nothing was written and no downstream
    /// effect may fire.
    DuplicateNoop,
    /// A different terminal status is already stored. The stored value wins;
    /// the conflict is a data-integrity anomaly to log, never an overwrite.
    Conflict {
        stored: PaymentStatus,
        proposed: PaymentStatus,
    },
}

/// The transition rule: first terminal status wins, repeats are no-ops,
/// contradictions are conflicts.
pub fn evaluate_transition(
    current: PaymentStatus,
    proposed: PaymentStatus,
) -> TransitionOutcome {
    if proposed == current {
        return TransitionOutcome::DuplicateNoop;
    }
    if !proposed.is_terminal() {
        // A stale CREATED observation against a settled payment carries no
        // information; absorb it.
        return TransitionOutcome::DuplicateNoop;
    }
    if current.is_terminal() {
        return TransitionOutcome::Conflict {
            stored: current,
            proposed,
        };
    }
    TransitionOutcome::Applied
}
