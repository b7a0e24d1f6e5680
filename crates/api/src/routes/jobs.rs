//! Job trigger route
//!
//! Lets a scheduler (or an operator) drive the job processor over HTTP. One
//! job per call; an empty queue is a success, not an error.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct JobTriggerQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobTriggerResponse {
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Token check: local runs are open, everything else requires the
/// configured token to match.
fn token_permitted(app_env: &str, configured: Option<&str>, presented: Option<&str>) -> bool {
    if app_env == "local" {
        return true;
    }
    match configured {
        Some(expected) => presented == Some(expected),
        None => false,
    }
}

pub async fn process_job(
    State(state): State<AppState>,
    Query(query): Query<JobTriggerQuery>,
) -> ApiResult<Json<JobTriggerResponse>> {
    if !token_permitted(
        &state.config.app_env,
        state.config.job_trigger_token.as_deref(),
        query.token.as_deref(),
    ) {
        return Err(ApiError::Unauthorized);
    }

    let response = match state.processor.process_next().await? {
        Some(report) => JobTriggerResponse {
            processed: true,
            job_id: Some(report.job_id),
            job_type: Some(report.job_type),
            success: Some(report.success),
            error: report.error,
        },
        None => JobTriggerResponse {
            processed: false,
            job_id: None,
            job_type: None,
            success: None,
            error: None,
        },
    };

    Ok(Json(response))
}
