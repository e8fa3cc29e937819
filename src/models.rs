// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wire Data Models
//!
//! Request and response structures for the gate API, plus the closed
//! decision sum shared by the gateway and the Core client. All wire types
//! are camelCase on the wire and derive `ToSchema` for OpenAPI documentation.
//!
//! ## Model Categories
//!
//! - **Decision**: the `PERMIT | DENY | ESCALATE` sum. Typed everywhere in
//!   the crate; the string form exists only at the serialization boundary.
//! - **Envelope**: the validated `{intent, execute, acceptance}` triple.
//! - **GateResult**: the single response shape for `/v1/gate` and
//!   `/v1/authorize`, in both success and failure form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::receipt::Receipt;

/// Stable machine-readable reason codes surfaced in `GateResult.reason`.
///
/// Clients switch on these; renaming any of them is a breaking API change.
pub mod reason {
    pub const METHOD_NOT_ALLOWED: &str = "method_not_allowed";
    pub const INVALID_JSON: &str = "invalid_json";
    pub const MISSING_REQUEST_BODY: &str = "missing_request_body";
    pub const INVALID_GATE_REQUEST: &str = "invalid_or_missing_gate_request";
    pub const INVALID_ACTION_FORMAT: &str = "invalid_action_format";
    pub const UNKNOWN_FORWARD_TARGET: &str = "unknown_forward_target";
    pub const CORE_UNREACHABLE: &str = "core_unreachable";
    pub const CORE_TIMEOUT: &str = "core_timeout";
    pub const CORE_MALFORMED_RESPONSE: &str = "core_malformed_response";
    pub const CORE_DENIED: &str = "core_denied";
    pub const RECEIPT_MINT_FAILED: &str = "receipt_mint_failed";
    pub const FORWARDING_FAILED: &str = "forwarding_failed";
    pub const ADAPTER_INTERNAL_ERROR: &str = "adapter_internal_error";
    pub const FORWARDED_AFTER_CORE_PERMIT: &str = "forwarded_after_core_permit";

    /// Reason for a Core HTTP failure, e.g. `core_http_502`.
    pub fn core_http(status: u16) -> String {
        format!("core_http_{status}")
    }
}

// =============================================================================
// Decision
// =============================================================================

/// Core decision over an envelope.
///
/// Only `Permit` unlocks receipt minting and forwarding; everything else is
/// terminal for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Permit,
    Deny,
    Escalate,
}

impl Decision {
    /// Wire string form, e.g. for log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Permit => "PERMIT",
            Decision::Deny => "DENY",
            Decision::Escalate => "ESCALATE",
        }
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// A structurally validated gate request.
///
/// Holds the three sub-mappings verbatim (they are canonicalized and hashed
/// as received) plus the two identity strings the validity predicate
/// guarantees to exist.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The `intent` mapping, opaque beyond `actor.id` and `intent`.
    pub intent: Value,
    /// The `execute` mapping, opaque beyond `action`.
    pub execute: Value,
    /// The issuer's acceptance. Consumed by Core only; never forwarded.
    pub acceptance: Value,
    /// `intent.actor.id`, guaranteed non-empty.
    pub actor_id: String,
    /// `intent.intent`, guaranteed non-empty.
    pub intent_name: String,
}

impl Envelope {
    /// Validate the gate request body.
    ///
    /// Requires `intent.actor.id` and `intent.intent` as non-empty strings,
    /// and `execute` and `acceptance` present as mappings. Everything else is
    /// left for the router and Core to judge.
    pub fn from_value(body: &Value) -> Option<Envelope> {
        let intent = body.get("intent")?;
        let actor_id = intent
            .get("actor")
            .and_then(|actor| actor.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())?;
        let intent_name = intent
            .get("intent")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())?;
        let execute = body.get("execute").filter(|v| v.is_object())?;
        let acceptance = body.get("acceptance").filter(|v| v.is_object())?;

        Some(Envelope {
            intent: intent.clone(),
            execute: execute.clone(),
            acceptance: acceptance.clone(),
            actor_id: actor_id.to_string(),
            intent_name: intent_name.to_string(),
        })
    }
}

// =============================================================================
// Gate Result
// =============================================================================

/// Outcome of one trip through the enforcement pipeline.
///
/// This is both the orchestrator's return type and the response body of
/// `POST /v1/gate`. Optional fields are omitted from the wire when absent.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    /// Terminal decision for this request.
    pub decision: Decision,
    /// Stable reason code (see [`reason`]) or Core's pass-through reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Signed execution receipt; present only on PERMIT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    /// HTTP status returned by the executor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_status: Option<u16>,
    /// Executor response body, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_body: Option<Value>,
    /// Digest the receipt was bound to (Core's if supplied).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execute_hash: Option<String>,
    /// Digest of the intent block (Core's if supplied).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_hash: Option<String>,
    /// Authority key id echoed from Core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_key_id: Option<String>,
}

impl GateResult {
    /// A DENY with a stable reason code and nothing else.
    pub fn deny(reason: impl Into<String>) -> GateResult {
        GateResult {
            decision: Decision::Deny,
            reason: Some(reason.into()),
            receipt: None,
            forward_status: None,
            forward_body: None,
            execute_hash: None,
            intent_hash: None,
            authority_key_id: None,
        }
    }

    /// Pass Core's non-PERMIT decision through unmodified, substituting a
    /// stable code only when Core supplied no reason at all.
    pub fn passthrough(decision: Decision, core_reason: Option<String>) -> GateResult {
        let mut result = GateResult::deny(
            core_reason.unwrap_or_else(|| reason::CORE_DENIED.to_string()),
        );
        result.decision = decision;
        result
    }
}
