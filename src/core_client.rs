// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Core Decision Client
//!
//! HTTP client for the external decision service ("Core"). The gateway
//! consults Core for every envelope; only a well-formed `PERMIT` response
//! unlocks forwarding.
//!
//! ## Fail-closed contract
//!
//! The public methods never return an error. Every transport, timeout,
//! status or parse failure collapses into a synthetic DENY carrying a
//! stable reason code:
//!
//! | Failure | Reason |
//! |---------|--------|
//! | deadline elapsed | `core_timeout` |
//! | DNS / TCP / TLS failure | `core_unreachable` |
//! | HTTP non-2xx | `core_http_<status>` |
//! | body not JSON, or `decision` missing/unknown | `core_malformed_response` |
//!
//! This is where fail-closed is implemented at the transport boundary; the
//! orchestrator upstream only ever sees a decision.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::CoreConfig;
use crate::models::{reason, Decision, Envelope};

/// Failure to construct the client at startup. Fatal, like any other
/// configuration problem.
#[derive(Debug, Error)]
pub enum CoreClientError {
    #[error("invalid Core header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("failed to build Core HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// A normalized Core response.
///
/// All metadata fields are optional echoes; the gateway prefers Core's
/// digests over its own when minting receipts.
#[derive(Debug, Clone)]
pub struct CoreDecision {
    pub decision: Decision,
    pub reason: Option<String>,
    pub execute_hash: Option<String>,
    pub intent_hash: Option<String>,
    pub issued_at: Option<String>,
    pub expires_at: Option<String>,
    pub time: Option<String>,
    pub authority_key_id: Option<String>,
}

impl CoreDecision {
    /// Synthetic DENY used for every failure path.
    fn fail_closed(reason: impl Into<String>) -> CoreDecision {
        CoreDecision {
            decision: Decision::Deny,
            reason: Some(reason.into()),
            execute_hash: None,
            intent_hash: None,
            issued_at: None,
            expires_at: None,
            time: None,
            authority_key_id: None,
        }
    }
}

/// Client for `{base_url}/v1/execute` and `{base_url}/v1/authorize`.
#[derive(Debug, Clone)]
pub struct CoreClient {
    base_url: String,
    http: reqwest::Client,
}

impl CoreClient {
    /// Build the client with the configured deadline and static headers.
    pub fn new(config: &CoreConfig) -> Result<CoreClient, CoreClientError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                CoreClientError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                }
            })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| CoreClientError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(CoreClient {
            base_url: config.base_url.clone(),
            http,
        })
    }

    /// Ask Core to decide over a full envelope.
    pub async fn execute(&self, envelope: &Envelope) -> CoreDecision {
        let body = json!({
            "intent": envelope.intent,
            "execute": envelope.execute,
            "acceptance": envelope.acceptance,
        });
        self.post_decision("/v1/execute", &body).await
    }

    /// Pre-flight an intent without committing to execution.
    pub async fn authorize(&self, intent: &Value) -> CoreDecision {
        let body = json!({ "intent": intent });
        self.post_decision("/v1/authorize", &body).await
    }

    async fn post_decision(&self, path: &str, body: &Value) -> CoreDecision {
        let url = format!("{}{path}", self.base_url);
        let response = match self.http.post(&url).json(body).send().await {
            Ok(response) => response,
            Err(error) => {
                let code = if error.is_timeout() {
                    reason::CORE_TIMEOUT
                } else {
                    reason::CORE_UNREACHABLE
                };
                tracing::warn!(%url, error = %error, reason = code, "core request failed");
                return CoreDecision::fail_closed(code);
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "core returned non-success status");
            return CoreDecision::fail_closed(reason::core_http(status.as_u16()));
        }

        let payload: Value = match response.json().await {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%url, error = %error, "core response was not JSON");
                return CoreDecision::fail_closed(reason::CORE_MALFORMED_RESPONSE);
            }
        };

        match normalize_decision(&payload) {
            Some(decision) => decision,
            None => {
                tracing::warn!(%url, "core response carried no usable decision");
                CoreDecision::fail_closed(reason::CORE_MALFORMED_RESPONSE)
            }
        }
    }
}

/// Map a raw Core payload onto the decision sum.
///
/// The sum is closed: any decision string other than the three known values
/// is treated as malformed rather than passed through.
fn normalize_decision(payload: &Value) -> Option<CoreDecision> {
    let decision = match payload.get("decision").and_then(Value::as_str)? {
        "PERMIT" => Decision::Permit,
        "DENY" => Decision::Deny,
        "ESCALATE" => Decision::Escalate,
        _ => return None,
    };

    let field = |name: &str| {
        payload
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Some(CoreDecision {
        decision,
        reason: field("reason"),
        execute_hash: field("executeHash"),
        intent_hash: field("intentHash"),
        issued_at: field("issuedAt"),
        expires_at: field("expiresAt"),
        time: field("time"),
        authority_key_id: field("authorityKeyId"),
    })
}
