//! Axum route handlers for the Eligibility API.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};

use crate::eligibility::models::{EligibilityRequest, EligibilityResponse};
use crate::errors::AppError;
use crate::state::AppState;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// First address in `X-Forwarded-For`, the original client as seen by the proxy.
fn client_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// POST /eligibility
///
/// Downloads the linked grant PDF, has the assistant extract eligibility criteria,
/// and returns the raw `checkEligibility` tool call as `criteria`.
pub async fn handle_check_eligibility(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<EligibilityRequest>, JsonRejection>,
) -> Result<Json<EligibilityResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let criteria = state
        .orchestrator
        .check_eligibility(&request, client_key(&headers))
        .await?;

    Ok(Json(EligibilityResponse { criteria }))
}
