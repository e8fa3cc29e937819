// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    gate::InternalError,
    models::{Decision, GateResult},
    state::AppState,
};

/// Gate request envelope.
///
/// Documentation shape only; the handler accepts raw JSON so structural
/// problems surface as a DENY with `invalid_or_missing_gate_request`
/// instead of a framework-generated 422.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GateRequest {
    /// Who wants what: must carry `actor.id` and `intent`.
    pub intent: Value,
    /// The side-effect payload; `action` selects the executor.
    pub execute: Value,
    /// Issuer-signed commitment, consumed by Core only.
    pub acceptance: Value,
}

#[utoipa::path(
    post,
    path = "/v1/gate",
    request_body = GateRequest,
    tag = "Gate",
    responses(
        (status = 200, description = "Core permitted; executed and forwarded", body = GateResult),
        (status = 403, description = "Denied or escalated", body = GateResult),
        (status = 400, description = "Malformed request", body = GateResult)
    )
)]
pub async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return rejection_error(&rejection).into_response(),
    };
    render(crate::gate::run(&state, &body).await)
}

/// Intent pre-flight request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// The intent to check; must be a mapping.
    pub intent: Value,
}

#[utoipa::path(
    post,
    path = "/v1/authorize",
    request_body = AuthorizeRequest,
    tag = "Gate",
    responses(
        (status = 200, description = "Core would permit this intent", body = GateResult),
        (status = 403, description = "Denied or escalated", body = GateResult),
        (status = 400, description = "Malformed request", body = GateResult)
    )
)]
pub async fn authorize(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return rejection_error(&rejection).into_response(),
    };
    render(Ok(crate::gate::authorize(&state, &body).await))
}

/// Fallback for non-POST methods on the gate routes.
pub async fn method_not_allowed() -> Response {
    ApiError::method_not_allowed().into_response()
}

fn rejection_error(rejection: &JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::JsonSyntaxError(_) | JsonRejection::JsonDataError(_) => {
            ApiError::invalid_json()
        }
        // No content-type / no readable body.
        _ => ApiError::missing_request_body(),
    }
}

/// Map a pipeline outcome onto the wire: PERMIT is 200, DENY/ESCALATE are
/// 403, and an internal defect is 500 with `adapter_internal_error`.
fn render(outcome: Result<GateResult, InternalError>) -> Response {
    match outcome {
        Ok(result) => {
            let status = match result.decision {
                Decision::Permit => StatusCode::OK,
                Decision::Deny | Decision::Escalate => StatusCode::FORBIDDEN,
            };
            (status, Json(result)).into_response()
        }
        Err(defect) => {
            tracing::error!(error = %defect, "request failed inside the gateway");
            ApiError::internal().into_response()
        }
    }
}
