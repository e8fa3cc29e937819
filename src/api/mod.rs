// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{Decision, GateResult},
    receipt::Receipt,
    state::AppState,
};

pub mod gate;
pub mod health;

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health endpoints (no auth, no pipeline)
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        // Enforcement pipeline
        .route(
            "/v1/gate",
            post(gate::submit).fallback(gate::method_not_allowed),
        )
        // Intent pre-flight (no mint, no forward)
        .route(
            "/v1/authorize",
            post(gate::authorize).fallback(gate::method_not_allowed),
        )
        // Swagger/OpenAPI docs
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer())
        .with_state(state)
}

/// Cross-origin policy for browser-hosted issuer consoles.
///
/// `CORS_ALLOWED_ORIGINS` (comma-separated) limits browsers to the listed
/// origins. The whole surface is JSON-over-POST plus health and docs reads,
/// so only GET, POST and the content-type header are offered either way.
/// An entry that does not parse as an origin is dropped, which can only
/// narrow the allowlist.
fn cors_layer() -> CorsLayer {
    let methods = [Method::GET, Method::POST];
    match std::env::var("CORS_ALLOWED_ORIGINS") {
        Ok(raw) => {
            let allowed: Vec<HeaderValue> = raw
                .split(',')
                .filter_map(|entry| match entry.trim().parse() {
                    Ok(origin) => Some(origin),
                    Err(_) => {
                        tracing::error!(entry = entry.trim(), "dropping unparseable origin from the allowlist");
                        None
                    }
                })
                .collect();
            tracing::info!(origins = allowed.len(), "cross-origin access limited to the allowlist");
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed))
                .allow_methods(methods)
                .allow_headers([header::CONTENT_TYPE])
        }
        Err(_) => {
            tracing::warn!("no origin allowlist configured; any origin may reach the gateway");
            CorsLayer::new()
                .allow_origin(AllowOrigin::any())
                .allow_methods(methods)
                .allow_headers([header::CONTENT_TYPE])
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Gate endpoints
        gate::submit,
        gate::authorize,
        // Health endpoints
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Decision,
            GateResult,
            Receipt,
            gate::GateRequest,
            gate::AuthorizeRequest,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "Gate", description = "Policy-gated execution and intent pre-flight"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
struct ApiDoc;
