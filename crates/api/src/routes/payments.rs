//! Payment creation, cancellation and status routes

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use atelje_settlement::{CheckDepth, NewPaymentInput, ProductType};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    /// Caller-chosen reference; generated when omitted.
    pub reference: Option<String>,
    pub amount_ore: i64,
    pub currency: Option<String>,
    pub product_type: String,
    pub product_id: Option<String>,
    pub payer_phone: String,
    pub customer_email: String,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub reference: String,
    pub provider_payment_id: Option<String>,
    pub status: String,
}

pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> ApiResult<Json<CreatePaymentResponse>> {
    let product_type = ProductType::parse(&request.product_type).ok_or_else(|| {
        ApiError::BadRequest(format!("unknown product type '{}'", request.product_type))
    })?;

    let reference = request
        .reference
        .unwrap_or_else(atelje_shared::new_payment_reference);

    let record = state
        .settlement
        .create_payment(NewPaymentInput {
            reference,
            amount_ore: request.amount_ore,
            currency: request.currency.unwrap_or_else(|| "SEK".to_string()),
            product_type,
            product_id: request.product_id,
            payer_phone: request.payer_phone,
            customer_email: request.customer_email,
            message: request.message.unwrap_or_default(),
        })
        .await?;

    Ok(Json(CreatePaymentResponse {
        reference: record.reference,
        provider_payment_id: record.provider_payment_id,
        status: record.status.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Force a fresh read instead of a memoized one.
    #[serde(default)]
    pub bypass_cache: bool,
    /// Force a live check against the provider instead of a local read.
    #[serde(default, rename = "forceCheck")]
    pub force_check: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub reference: String,
    pub status: String,
    /// `false` while the payment is still processing; the UI shows a
    /// waiting state for it, not an error.
    pub terminal: bool,
}

pub async fn payment_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let depth = if query.force_check {
        CheckDepth::Forced
    } else if query.bypass_cache {
        CheckDepth::Fresh
    } else {
        CheckDepth::Cached
    };

    let status = state.settlement.status_snapshot(&reference, depth).await?;

    Ok(Json(StatusResponse {
        reference,
        status: status.to_string(),
        terminal: status.is_terminal(),
    }))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub reference: String,
    pub status: String,
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    state.settlement.cancel(&reference).await?;

    let status = state
        .settlement
        .status_snapshot(&reference, CheckDepth::Fresh)
        .await?;

    Ok(Json(CancelResponse {
        reference,
        status: status.to_string(),
    }))
}
