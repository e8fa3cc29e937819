// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Gate Orchestrator
//!
//! The state machine at the heart of the gateway. For one request the
//! sequence is strict and observable:
//!
//! ```text
//! validate → route → core → mint → forward
//! ```
//!
//! No step is reordered, skipped or run concurrently with another; each
//! failing step terminates the pipeline with a `GateResult` carrying a
//! stable reason. Forwarding is unreachable unless Core returned PERMIT for
//! this exact envelope; the receipt is minted from that PERMIT and from
//! nothing else.
//!
//! Requests are independent: nothing here reads or writes shared mutable
//! state, caches a decision, or retries a boundary.

use serde_json::Value;
use thiserror::Error;

use crate::canonical::{self, CanonicalizeError};
use crate::models::{reason, Decision, Envelope, GateResult};
use crate::receipt::MintInputs;
use crate::routing;
use crate::state::AppState;

/// A defect inside the gateway itself, as opposed to a policy outcome.
///
/// Policy outcomes (including every fail-closed DENY) are `GateResult`s;
/// this error is reserved for conditions that should be impossible at
/// request time and is rendered by the API layer as a 500 with
/// `adapter_internal_error`.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("canonicalization failed over a parsed envelope: {0}")]
    Canonicalize(#[from] CanonicalizeError),
}

/// Run one envelope through the full enforcement pipeline.
pub async fn run(state: &AppState, body: &Value) -> Result<GateResult, InternalError> {
    // Validate.
    let Some(envelope) = Envelope::from_value(body) else {
        return Ok(GateResult::deny(reason::INVALID_GATE_REQUEST));
    };

    // Route.
    let action = match routing::parse_action(&envelope.execute) {
        Ok(action) => action,
        Err(error) => return Ok(GateResult::deny(error.code())),
    };
    let target = match routing::resolve(&state.config.targets, &action.service) {
        Ok(target) => target,
        Err(error) => return Ok(GateResult::deny(error.code())),
    };

    // Local digests are always computed; Core's may override them below.
    // Canonicalizing a parsed envelope cannot fail for real JSON input, so
    // a failure here is a defect, not a policy outcome.
    let local_intent_hash = canonical::intent_hash(&envelope.intent)?;
    let local_execute_hash = canonical::execute_hash(&envelope.execute)?;

    // Consult Core. Every failure inside the client is already a DENY.
    let core = state.core.execute(&envelope).await;
    if core.decision != Decision::Permit {
        tracing::info!(
            actor = %envelope.actor_id,
            intent = %envelope.intent_name,
            service = %action.service,
            decision = core.decision.as_str(),
            "core did not permit"
        );
        return Ok(GateResult::passthrough(core.decision, core.reason));
    }

    // Core is authoritative on digests; log divergence for audit.
    let intent_hash = core
        .intent_hash
        .clone()
        .unwrap_or_else(|| local_intent_hash.clone());
    let execute_hash = core
        .execute_hash
        .clone()
        .unwrap_or_else(|| local_execute_hash.clone());
    if intent_hash != local_intent_hash || execute_hash != local_execute_hash {
        tracing::warn!(
            core_execute_hash = %execute_hash,
            local_execute_hash = %local_execute_hash,
            core_intent_hash = %intent_hash,
            local_intent_hash = %local_intent_hash,
            "core digests diverge from locally computed digests"
        );
    }

    // Mint.
    let receipt = match state.signer.sign(&MintInputs {
        service: &action.service,
        actor_id: &envelope.actor_id,
        intent: &envelope.intent_name,
        intent_hash: &intent_hash,
        execute_hash: &execute_hash,
        authority_key_id: core.authority_key_id.as_deref(),
        core_issued_at: core.issued_at.as_deref(),
        core_expires_at: core.expires_at.as_deref(),
        core_time: core.time.as_deref(),
    }) {
        Ok(receipt) => receipt,
        Err(error) => {
            tracing::error!(error = %error, "receipt minting failed after PERMIT");
            return Ok(GateResult::deny(reason::RECEIPT_MINT_FAILED));
        }
    };

    // Forward on a detached task: once Core has permitted, an abandoned
    // client connection must not cancel the committed side effect.
    let forward = {
        let forwarder = state.forwarder.clone();
        let target = target.clone();
        let envelope = envelope.clone();
        let receipt_for_forward = receipt.clone();
        tokio::spawn(async move {
            forwarder
                .forward(&target, &envelope, &receipt_for_forward)
                .await
        })
    };
    let outcome = match forward.await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(error)) => {
            tracing::warn!(
                service = %action.service,
                error = %error,
                "forwarding failed after PERMIT"
            );
            return Ok(GateResult::deny(reason::FORWARDING_FAILED));
        }
        Err(join_error) => {
            tracing::error!(error = %join_error, "forward task failed");
            return Ok(GateResult::deny(reason::FORWARDING_FAILED));
        }
    };

    tracing::info!(
        actor = %envelope.actor_id,
        intent = %envelope.intent_name,
        service = %action.service,
        receipt_id = %receipt.receipt_id,
        forward_status = outcome.status,
        "forwarded after core permit"
    );

    Ok(GateResult {
        decision: Decision::Permit,
        reason: Some(reason::FORWARDED_AFTER_CORE_PERMIT.to_string()),
        receipt: Some(receipt),
        forward_status: Some(outcome.status),
        forward_body: Some(outcome.body),
        execute_hash: Some(execute_hash),
        intent_hash: Some(intent_hash),
        authority_key_id: core.authority_key_id,
    })
}

/// Pre-flight an intent against Core's `/v1/authorize` without committing
/// to execution. Never mints, never forwards.
pub async fn authorize(state: &AppState, body: &Value) -> GateResult {
    let Some(intent) = body.get("intent").filter(|v| v.is_object()) else {
        return GateResult::deny(reason::INVALID_GATE_REQUEST);
    };

    let core = state.core.authorize(intent).await;
    match core.decision {
        Decision::Permit => GateResult {
            decision: Decision::Permit,
            reason: core.reason,
            receipt: None,
            forward_status: None,
            forward_body: None,
            execute_hash: None,
            intent_hash: core.intent_hash,
            authority_key_id: core.authority_key_id,
        },
        other => GateResult::passthrough(other, core.reason),
    }
}
