// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end pipeline tests with HTTP doubles for Core and the executor.
//!
//! Each test drives the real router with a real request body and asserts
//! the wire-level outcome, including the invariant that the executor double
//! sees zero calls on every non-PERMIT path.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::spki::EncodePublicKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tower::ServiceExt;

use solace_gate::api::router;
use solace_gate::canonical;
use solace_gate::config::{CoreConfig, GateConfig};
use solace_gate::receipt::{encode_receipt_header, verifying_key_from_pem, Receipt};
use solace_gate::routing::ForwardTarget;
use solace_gate::state::AppState;
use solace_gate::verifier::verify_executor_request;

fn keypair_pems() -> (String, String) {
    let key = ed25519_dalek::SigningKey::from_bytes(&[42u8; 32]);
    (
        key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
        key.verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap(),
    )
}

fn app_for(core_base_url: String, executor_url: String) -> axum::Router {
    let (private_pem, public_pem) = keypair_pems();
    let state = AppState::new(GateConfig {
        adapter_id: "adapter-e2e".to_string(),
        receipt_private_key_pem: private_pem,
        receipt_public_key_pem: public_pem,
        receipt_ttl_seconds: 30,
        clock_skew_seconds: 10,
        core: CoreConfig {
            base_url: core_base_url,
            timeout: Duration::from_millis(2000),
            headers: HashMap::new(),
        },
        targets: HashMap::from([(
            "payments".to_string(),
            ForwardTarget {
                url: executor_url,
                bearer_token: None,
            },
        )]),
    })
    .expect("state builds");
    router(state)
}

fn envelope_body() -> Value {
    json!({
        "intent": {"actor": {"id": "u1"}, "intent": "refund"},
        "execute": {"action": "payments:refund", "amount": 100, "currency": "USD"},
        "acceptance": {"signature": "issuer-sig", "authorityKeyId": "k1"}
    })
}

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    (status, body)
}

#[tokio::test]
async fn happy_path_forwards_with_a_verifiable_receipt() {
    let core = MockServer::start();
    let executor = MockServer::start();

    let body = envelope_body();
    let execute = body["execute"].clone();
    let execute_hash = canonical::execute_hash(&execute).unwrap();
    let intent_hash = canonical::intent_hash(&body["intent"]).unwrap();

    let core_mock = core.mock(|when, then| {
        when.method(POST)
            .path("/v1/execute")
            .json_body_partial(r#"{"acceptance": {"signature": "issuer-sig", "authorityKeyId": "k1"}}"#);
        then.status(200).json_body(json!({
            "decision": "PERMIT",
            "executeHash": execute_hash,
            "intentHash": intent_hash,
            "authorityKeyId": "k1",
            "issuedAt": "2025-01-01T00:00:00Z",
            "expiresAt": "2025-01-01T00:05:00Z"
        }));
    });

    // Exact body match: a leaked acceptance would fail this matcher.
    let executor_mock = executor.mock(|when, then| {
        when.method(POST)
            .path("/payments")
            .header_exists("x-solace-receipt")
            .json_body(json!({
                "intent": body["intent"],
                "execute": execute
            }));
        then.status(200).json_body(json!({"ok": true}));
    });

    let app = app_for(core.base_url(), executor.url("/payments"));
    let (status, response) = post_json(app, "/v1/gate", body).await;

    core_mock.assert();
    executor_mock.assert();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["decision"], "PERMIT");
    assert_eq!(response["reason"], "forwarded_after_core_permit");
    assert_eq!(response["forwardStatus"], 200);
    assert_eq!(response["forwardBody"], json!({"ok": true}));
    assert_eq!(response["executeHash"], json!(execute_hash));
    assert_eq!(response["intentHash"], json!(intent_hash));
    assert_eq!(response["authorityKeyId"], "k1");

    let receipt = &response["receipt"];
    assert_eq!(receipt["v"], 1);
    assert_eq!(receipt["adapterId"], "adapter-e2e");
    assert_eq!(receipt["service"], "payments");
    assert_eq!(receipt["actorId"], "u1");
    assert_eq!(receipt["intent"], "refund");
    assert_eq!(receipt["executeHash"], json!(execute_hash));
    assert_eq!(receipt["coreDecision"], "PERMIT");
    assert_eq!(receipt["authorityKeyId"], "k1");
    assert_eq!(receipt["coreIssuedAt"], "2025-01-01T00:00:00Z");

    // The executor-side verifier accepts this receipt for this payload.
    let (_, public_pem) = keypair_pems();
    let public_key = verifying_key_from_pem(&public_pem).unwrap();
    let typed: Receipt = serde_json::from_value(receipt.clone()).unwrap();
    let header = encode_receipt_header(&typed).unwrap();
    let verification =
        verify_executor_request(Some(&header), Some(&public_key), "payments", &execute);
    assert!(verification.ok, "verifier rejected: {:?}", verification.reason);
}

#[tokio::test]
async fn local_hashes_are_used_when_core_returns_none() {
    let core = MockServer::start();
    let executor = MockServer::start();

    core.mock(|when, then| {
        when.method(POST).path("/v1/execute");
        then.status(200).json_body(json!({"decision": "PERMIT"}));
    });
    executor.mock(|when, then| {
        when.method(POST).path("/payments");
        then.status(200).json_body(json!({"ok": true}));
    });

    let body = envelope_body();
    let expected = canonical::execute_hash(&body["execute"]).unwrap();

    let app = app_for(core.base_url(), executor.url("/payments"));
    let (status, response) = post_json(app, "/v1/gate", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["executeHash"], json!(expected));
    assert_eq!(response["receipt"]["executeHash"], json!(expected));
}

#[tokio::test]
async fn core_deny_passes_through_and_never_forwards() {
    let core = MockServer::start();
    let executor = MockServer::start();

    core.mock(|when, then| {
        when.method(POST).path("/v1/execute");
        then.status(200)
            .json_body(json!({"decision": "DENY", "reason": "schema_violation"}));
    });
    let executor_mock = executor.mock(|when, then| {
        when.method(POST).path("/payments");
        then.status(200).json_body(json!({"ok": true}));
    });

    let app = app_for(core.base_url(), executor.url("/payments"));
    let (status, response) = post_json(app, "/v1/gate", envelope_body()).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["decision"], "DENY");
    assert_eq!(response["reason"], "schema_violation");
    assert!(response.get("receipt").is_none());
    assert_eq!(executor_mock.hits(), 0);
}

#[tokio::test]
async fn core_escalate_passes_through_and_never_forwards() {
    let core = MockServer::start();
    let executor = MockServer::start();

    core.mock(|when, then| {
        when.method(POST).path("/v1/execute");
        then.status(200)
            .json_body(json!({"decision": "ESCALATE", "reason": "human_approval_required"}));
    });
    let executor_mock = executor.mock(|when, then| {
        when.method(POST).path("/payments");
        then.status(200);
    });

    let app = app_for(core.base_url(), executor.url("/payments"));
    let (status, response) = post_json(app, "/v1/gate", envelope_body()).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["decision"], "ESCALATE");
    assert_eq!(response["reason"], "human_approval_required");
    assert_eq!(executor_mock.hits(), 0);
}

#[tokio::test]
async fn unknown_service_denies_before_core() {
    let core = MockServer::start();
    let executor = MockServer::start();

    let core_mock = core.mock(|when, then| {
        when.method(POST).path("/v1/execute");
        then.status(200).json_body(json!({"decision": "PERMIT"}));
    });

    let mut body = envelope_body();
    body["execute"]["action"] = json!("unknown:op");

    let app = app_for(core.base_url(), executor.url("/payments"));
    let (status, response) = post_json(app, "/v1/gate", body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["reason"], "unknown_forward_target");
    assert_eq!(core_mock.hits(), 0);
}

#[tokio::test]
async fn malformed_action_denies_before_core() {
    let core = MockServer::start();
    let executor = MockServer::start();

    let core_mock = core.mock(|when, then| {
        when.method(POST).path("/v1/execute");
        then.status(200).json_body(json!({"decision": "PERMIT"}));
    });

    let mut body = envelope_body();
    body["execute"]["action"] = json!("payments_refund");

    let app = app_for(core.base_url(), executor.url("/payments"));
    let (status, response) = post_json(app, "/v1/gate", body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["reason"], "invalid_action_format");
    assert_eq!(core_mock.hits(), 0);
}

#[tokio::test]
async fn every_core_failure_mode_fails_closed() {
    // (status, body, expected reason)
    let cases: Vec<(u16, &str, String)> = vec![
        (500, r#"{"decision": "PERMIT"}"#, "core_http_500".to_string()),
        (503, "", "core_http_503".to_string()),
        (200, "not json at all", "core_malformed_response".to_string()),
        (200, r#"{"verdict": "PERMIT"}"#, "core_malformed_response".to_string()),
        (200, r#"{"decision": "MAYBE"}"#, "core_malformed_response".to_string()),
    ];

    for (core_status, core_body, expected_reason) in cases {
        let core = MockServer::start();
        let executor = MockServer::start();

        core.mock(|when, then| {
            when.method(POST).path("/v1/execute");
            then.status(core_status).body(core_body);
        });
        let executor_mock = executor.mock(|when, then| {
            when.method(POST).path("/payments");
            then.status(200);
        });

        let app = app_for(core.base_url(), executor.url("/payments"));
        let (status, response) = post_json(app, "/v1/gate", envelope_body()).await;

        assert_eq!(status, StatusCode::FORBIDDEN, "case {expected_reason}");
        assert_eq!(response["decision"], "DENY", "case {expected_reason}");
        assert_eq!(response["reason"], json!(expected_reason));
        assert_eq!(executor_mock.hits(), 0);
    }
}

#[tokio::test]
async fn unreachable_core_fails_closed() {
    let executor = MockServer::start();
    let executor_mock = executor.mock(|when, then| {
        when.method(POST).path("/payments");
        then.status(200);
    });

    // Nothing listens on port 1.
    let app = app_for("http://127.0.0.1:1".to_string(), executor.url("/payments"));
    let (status, response) = post_json(app, "/v1/gate", envelope_body()).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["decision"], "DENY");
    assert_eq!(response["reason"], "core_unreachable");
    assert_eq!(executor_mock.hits(), 0);
}

#[tokio::test]
async fn executor_outage_after_permit_is_forwarding_failed() {
    let core = MockServer::start();

    core.mock(|when, then| {
        when.method(POST).path("/v1/execute");
        then.status(200).json_body(json!({"decision": "PERMIT"}));
    });

    let app = app_for(core.base_url(), "http://127.0.0.1:1/payments".to_string());
    let (status, response) = post_json(app, "/v1/gate", envelope_body()).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["decision"], "DENY");
    assert_eq!(response["reason"], "forwarding_failed");
}

#[tokio::test]
async fn executor_error_status_is_surfaced_verbatim() {
    let core = MockServer::start();
    let executor = MockServer::start();

    core.mock(|when, then| {
        when.method(POST).path("/v1/execute");
        then.status(200).json_body(json!({"decision": "PERMIT"}));
    });
    executor.mock(|when, then| {
        when.method(POST).path("/payments");
        then.status(409)
            .json_body(json!({"decision": "DENY", "reason": "duplicate_receipt"}));
    });

    let app = app_for(core.base_url(), executor.url("/payments"));
    let (status, response) = post_json(app, "/v1/gate", envelope_body()).await;

    // The gateway itself permitted; the executor's refusal is reported as-is.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["decision"], "PERMIT");
    assert_eq!(response["forwardStatus"], 409);
    assert_eq!(response["forwardBody"]["reason"], "duplicate_receipt");
}

#[tokio::test]
async fn tampered_payload_is_rejected_by_the_executor_verifier() {
    let core = MockServer::start();
    let executor = MockServer::start();

    core.mock(|when, then| {
        when.method(POST).path("/v1/execute");
        then.status(200).json_body(json!({"decision": "PERMIT"}));
    });
    executor.mock(|when, then| {
        when.method(POST).path("/payments");
        then.status(200).json_body(json!({"ok": true}));
    });

    let app = app_for(core.base_url(), executor.url("/payments"));
    let (_, response) = post_json(app, "/v1/gate", envelope_body()).await;

    // Harness plays a tampering middlebox: same receipt, inflated amount.
    let typed: Receipt = serde_json::from_value(response["receipt"].clone()).unwrap();
    let header = encode_receipt_header(&typed).unwrap();
    let (_, public_pem) = keypair_pems();
    let public_key = verifying_key_from_pem(&public_pem).unwrap();

    let tampered = json!({"action": "payments:refund", "amount": 10000, "currency": "USD"});
    let verification =
        verify_executor_request(Some(&header), Some(&public_key), "payments", &tampered);
    assert!(!verification.ok);
    assert_eq!(verification.reason, Some("execute_hash_mismatch"));
}

#[tokio::test]
async fn authorize_preflight_never_touches_the_executor() {
    let core = MockServer::start();
    let executor = MockServer::start();

    let core_mock = core.mock(|when, then| {
        when.method(POST)
            .path("/v1/authorize")
            .json_body(json!({"intent": {"actor": {"id": "u1"}, "intent": "refund"}}));
        then.status(200)
            .json_body(json!({"decision": "PERMIT", "intentHash": "H_i"}));
    });
    let executor_mock = executor.mock(|when, then| {
        when.method(POST).path("/payments");
        then.status(200);
    });

    let app = app_for(core.base_url(), executor.url("/payments"));
    let (status, response) = post_json(
        app,
        "/v1/authorize",
        json!({"intent": {"actor": {"id": "u1"}, "intent": "refund"}}),
    )
    .await;

    core_mock.assert();
    assert_eq!(executor_mock.hits(), 0);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["decision"], "PERMIT");
    assert_eq!(response["intentHash"], "H_i");
    assert!(response.get("receipt").is_none());
}
