// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Executor Forwarding
//!
//! Delivers a permitted execute payload to its target executor, carrying the
//! signed receipt in the `x-solace-receipt` header.
//!
//! The forward body is an explicit two-field structure (`intent`, `execute`).
//! The envelope's `acceptance` is the issuer's credential toward Core and
//! must never travel further than the gateway; building the body from named
//! fields rather than the whole envelope makes that structural.
//!
//! The forwarder reports executor responses as-is (status plus parsed body);
//! deciding what a failure means for the client is the orchestrator's job.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::Envelope;
use crate::receipt::{encode_receipt_header, Receipt, ReceiptError, RECEIPT_HEADER};
use crate::routing::ForwardTarget;

/// Transport-level forwarding failure. The orchestrator converts this into
/// a `forwarding_failed` DENY.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("forward request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Receipt(#[from] ReceiptError),
}

/// What the executor said.
#[derive(Debug, Clone)]
pub struct ForwardOutcome {
    pub status: u16,
    /// Parsed JSON body, or `{"_raw": <text>}` when the executor did not
    /// answer with JSON.
    pub body: Value,
}

/// Exactly the two envelope fields an executor is allowed to see.
#[derive(Serialize)]
struct ForwardBody<'a> {
    intent: &'a Value,
    execute: &'a Value,
}

/// HTTP delivery to configured executors.
#[derive(Debug, Clone)]
pub struct Forwarder {
    http: reqwest::Client,
}

impl Forwarder {
    /// Build the forwarding client. The deadline defaults to the Core
    /// timeout at the call site; there is no retry at this boundary.
    pub fn new(timeout: Duration) -> Result<Forwarder, reqwest::Error> {
        Ok(Forwarder {
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub async fn forward(
        &self,
        target: &ForwardTarget,
        envelope: &Envelope,
        receipt: &Receipt,
    ) -> Result<ForwardOutcome, ForwardError> {
        let mut request = self
            .http
            .post(&target.url)
            .header(CONTENT_TYPE, "application/json")
            .header(RECEIPT_HEADER, encode_receipt_header(receipt)?)
            .json(&ForwardBody {
                intent: &envelope.intent,
                execute: &envelope.execute,
            });

        if let Some(token) = &target.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "_raw": text }));

        Ok(ForwardOutcome { status, body })
    }
}
