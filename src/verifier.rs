// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Executor-Side Verification
//!
//! The contract an executor must honor before performing any side effect.
//! Executors import this module (or reimplement it exactly): decode the
//! receipt header, check it names your service, verify the signature and
//! validity window, then recompute the execute digest over the body you
//! actually received and compare it to the digest the receipt was signed
//! over. The last step is what catches payload tampering between the
//! gateway and the executor.
//!
//! Idempotency (replay of a still-valid receipt) is the executor's own
//! responsibility, keyed on `receiptId` or `executeHash` against its store.
//!
//! Kept free of any server machinery so the module can be lifted into an
//! executor crate unchanged.

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde_json::Value;

use crate::canonical::execute_hash;
use crate::receipt::{decode_receipt_header, verify_receipt, Receipt};

/// Default skew applied when the caller does not supply one.
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 10;

/// Result of verifying one inbound executor request.
#[derive(Debug, Clone)]
pub struct ExecutorVerification {
    pub ok: bool,
    /// Stable failure code; `None` when `ok`.
    pub reason: Option<&'static str>,
    /// The decoded receipt, when the header decoded at all.
    pub receipt: Option<Receipt>,
    /// Digest recomputed over the received execute object.
    pub execute_hash: Option<String>,
}

impl ExecutorVerification {
    fn accept(receipt: Receipt, execute_hash: String) -> ExecutorVerification {
        ExecutorVerification {
            ok: true,
            reason: None,
            receipt: Some(receipt),
            execute_hash: Some(execute_hash),
        }
    }

    fn reject(reason: &'static str, receipt: Option<Receipt>) -> ExecutorVerification {
        ExecutorVerification {
            ok: false,
            reason: Some(reason),
            receipt,
            execute_hash: None,
        }
    }
}

/// Verify with the current wall clock and default skew.
pub fn verify_executor_request(
    receipt_header: Option<&str>,
    receipt_public_key: Option<&VerifyingKey>,
    expected_service: &str,
    received_execute: &Value,
) -> ExecutorVerification {
    verify_executor_request_at(
        receipt_header,
        receipt_public_key,
        expected_service,
        received_execute,
        Utc::now(),
        DEFAULT_CLOCK_SKEW_SECONDS,
    )
}

/// Verify with an explicit clock and skew, for deterministic tests.
pub fn verify_executor_request_at(
    receipt_header: Option<&str>,
    receipt_public_key: Option<&VerifyingKey>,
    expected_service: &str,
    received_execute: &Value,
    now: DateTime<Utc>,
    clock_skew_seconds: i64,
) -> ExecutorVerification {
    let Some((receipt, raw)) = receipt_header.and_then(decode_receipt_header) else {
        return ExecutorVerification::reject("missing_or_invalid_receipt_header", None);
    };

    if receipt.service != expected_service {
        return ExecutorVerification::reject("receipt_service_mismatch", Some(receipt));
    }

    if let Err(failure) = verify_receipt(&raw, receipt_public_key, now, clock_skew_seconds) {
        return ExecutorVerification::reject(failure.code(), Some(receipt));
    }

    let Ok(computed) = execute_hash(received_execute) else {
        return ExecutorVerification::reject("execute_hash_mismatch", Some(receipt));
    };
    if computed != receipt.execute_hash {
        return ExecutorVerification::reject("execute_hash_mismatch", Some(receipt));
    }

    ExecutorVerification::accept(receipt, computed)
}
