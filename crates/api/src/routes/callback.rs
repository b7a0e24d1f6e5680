//! Provider callback route
//!
//! The provider retries undeliverable callbacks aggressively. To avoid retry
//! storms the endpoint acknowledges every payload it can parse; processing
//! failures are logged for operator follow-up and recovered by the
//! reconcile sweep, not by provider redelivery.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use atelje_settlement::CallbackPayload;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    pub received: bool,
}

pub async fn payment_callback(
    State(state): State<AppState>,
    Json(payload): Json<CallbackPayload>,
) -> Json<CallbackAck> {
    match state.settlement.handle_callback(&payload).await {
        Ok(outcome) => {
            tracing::debug!(
                reference = %payload.payee_payment_reference,
                outcome = ?outcome,
                "Callback processed"
            );
        }
        Err(e) => {
            tracing::error!(
                reference = %payload.payee_payment_reference,
                status = %payload.status,
                error = %e,
                "Callback processing failed; acknowledged anyway"
            );
        }
    }

    Json(CallbackAck { received: true })
}
