// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Error Handling
//!
//! Transport-level error type for the HTTP layer. The gate wire contract
//! promises a `decision` field in every response body, including malformed
//! requests and defensive 500s, so this type renders as a DENY `GateResult`
//! rather than a bare message.
//!
//! ## JSON Response Format
//!
//! ```json
//! { "decision": "DENY", "reason": "invalid_json" }
//! ```
//!
//! Domain failures never pass through here; the orchestrator converts
//! those to `GateResult`s itself. `ApiError` covers what happens before a
//! request reaches the pipeline (bad JSON, wrong method) and what should
//! never happen at all (internal defects).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::{reason, GateResult};

/// API error with HTTP status and a stable reason code.
///
/// Implements `IntoResponse`, allowing it to be returned directly from
/// Axum handlers.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code for the response.
    pub status: StatusCode,
    /// Stable reason code carried in the response body.
    pub reason: String,
}

impl ApiError {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    /// 400 with `invalid_json`: the body was present but not parseable.
    pub fn invalid_json() -> Self {
        Self::new(StatusCode::BAD_REQUEST, reason::INVALID_JSON)
    }

    /// 400 with `missing_request_body`.
    pub fn missing_request_body() -> Self {
        Self::new(StatusCode::BAD_REQUEST, reason::MISSING_REQUEST_BODY)
    }

    /// 405 for anything but POST on the gate routes.
    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, reason::METHOD_NOT_ALLOWED)
    }

    /// 500 with `adapter_internal_error`. Defensive; the pipeline itself
    /// fails closed long before this.
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            reason::ADAPTER_INTERNAL_ERROR,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(GateResult::deny(self.reason))).into_response()
    }
}
