// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Execution Receipts
//!
//! Receipts are the signed artifact the gateway mints after Core permits an
//! envelope. A receipt binds the PERMIT to one exact `execute` payload (via
//! its canonical digest) and one target service, for a short validity
//! window. Executors verify the signature and recompute the digest before
//! performing any side effect.
//!
//! ## Signature base
//!
//! The Ed25519 signature covers the canonical form (see [`crate::canonical`])
//! of the receipt object with the `signature` field removed. Verification
//! canonicalizes the receipt exactly as received, so field order on the wire
//! is irrelevant and absent optional fields stay absent.
//!
//! ## Verification order
//!
//! [`verify_receipt`] checks its predicates in a fixed order and reports the
//! earliest failure: public key present, schema version, PERMIT constant,
//! signature present, parseable times, not-yet-valid, expired, signature.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ed25519_dalek::pkcs8::spki::DecodePublicKey;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::canonical::{canonical_bytes, CanonicalizeError};
use crate::models::Decision;

/// Receipt schema version minted by this gateway.
pub const RECEIPT_SCHEMA_VERSION: u32 = 1;

/// Header carrying the base64-encoded receipt JSON on forwarded requests.
pub const RECEIPT_HEADER: &str = "x-solace-receipt";

/// Errors raised while building or encoding receipts.
#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("adapter identity is missing or empty")]
    MissingAdapterId,

    #[error("invalid receipt private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid receipt public key: {0}")]
    InvalidPublicKey(String),

    #[error(transparent)]
    Canonicalize(#[from] CanonicalizeError),

    #[error("receipt serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A signed execution receipt.
///
/// Field semantics follow the wire contract: `coreIssuedAt`, `coreExpiresAt`
/// and `coreTime` are audit echoes of Core's response, while `issuedAt` and
/// `expiresAt` delimit the receipt's own validity window.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Schema version, fixed to 1.
    pub v: u32,
    /// Fresh UUIDv4, the executor's idempotency handle.
    pub receipt_id: String,
    /// Identity of the gateway deployment that minted this receipt.
    pub adapter_id: String,
    /// Logical name of the target executor.
    pub service: String,
    /// `intent.actor.id` from the envelope.
    pub actor_id: String,
    /// `intent.intent` from the envelope.
    pub intent: String,
    /// Digest of the intent block.
    pub intent_hash: String,
    /// Digest of the execute payload this receipt is bound to.
    pub execute_hash: String,
    /// Always `PERMIT`; receipts exist only for permits.
    pub core_decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_issued_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_time: Option<String>,
    /// Start of the receipt validity window, ISO-8601 UTC.
    pub issued_at: String,
    /// End of the receipt validity window.
    pub expires_at: String,
    /// Base64 (standard) Ed25519 signature. Absent only while signing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Inputs for minting one receipt; everything the envelope and Core decided.
pub struct MintInputs<'a> {
    pub service: &'a str,
    pub actor_id: &'a str,
    pub intent: &'a str,
    pub intent_hash: &'a str,
    pub execute_hash: &'a str,
    pub authority_key_id: Option<&'a str>,
    pub core_issued_at: Option<&'a str>,
    pub core_expires_at: Option<&'a str>,
    pub core_time: Option<&'a str>,
}

/// Parse an Ed25519 signing key from PKCS8 PEM.
pub fn signing_key_from_pem(pem: &str) -> Result<SigningKey, ReceiptError> {
    SigningKey::from_pkcs8_pem(pem).map_err(|e| ReceiptError::InvalidPrivateKey(e.to_string()))
}

/// Parse an Ed25519 verifying key from SPKI PEM.
pub fn verifying_key_from_pem(pem: &str) -> Result<VerifyingKey, ReceiptError> {
    VerifyingKey::from_public_key_pem(pem).map_err(|e| ReceiptError::InvalidPublicKey(e.to_string()))
}

/// Encode a receipt for the `x-solace-receipt` header: base64(JSON).
pub fn encode_receipt_header(receipt: &Receipt) -> Result<String, ReceiptError> {
    Ok(BASE64.encode(serde_json::to_vec(receipt)?))
}

/// Decode an `x-solace-receipt` header back into a receipt.
///
/// Returns both the typed receipt and the raw JSON value; signature
/// verification must run over the raw value so the bytes checked are the
/// bytes sent.
pub fn decode_receipt_header(header: &str) -> Option<(Receipt, Value)> {
    let bytes = BASE64.decode(header.trim()).ok()?;
    let raw: Value = serde_json::from_slice(&bytes).ok()?;
    let receipt: Receipt = serde_json::from_value(raw.clone()).ok()?;
    Some((receipt, raw))
}

// =============================================================================
// Signing
// =============================================================================

/// Mints signed receipts with a fixed identity, key and TTL.
///
/// Constructed once at startup; immutable and cheap to share afterwards.
pub struct ReceiptSigner {
    adapter_id: String,
    ttl_seconds: i64,
    signing_key: SigningKey,
}

impl ReceiptSigner {
    pub fn new(
        adapter_id: impl Into<String>,
        private_key_pem: &str,
        ttl_seconds: i64,
    ) -> Result<ReceiptSigner, ReceiptError> {
        let adapter_id = adapter_id.into();
        if adapter_id.trim().is_empty() {
            return Err(ReceiptError::MissingAdapterId);
        }
        Ok(ReceiptSigner {
            adapter_id,
            ttl_seconds,
            signing_key: signing_key_from_pem(private_key_pem)?,
        })
    }

    /// The verifying key matching this signer's private key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Mint a receipt valid from now until now + TTL.
    pub fn sign(&self, inputs: &MintInputs<'_>) -> Result<Receipt, ReceiptError> {
        self.sign_at(inputs, Utc::now())
    }

    /// Mint a receipt with an explicit clock, for deterministic tests.
    pub fn sign_at(
        &self,
        inputs: &MintInputs<'_>,
        now: DateTime<Utc>,
    ) -> Result<Receipt, ReceiptError> {
        let expires = now + Duration::seconds(self.ttl_seconds);
        let mut receipt = Receipt {
            v: RECEIPT_SCHEMA_VERSION,
            receipt_id: Uuid::new_v4().to_string(),
            adapter_id: self.adapter_id.clone(),
            service: inputs.service.to_string(),
            actor_id: inputs.actor_id.to_string(),
            intent: inputs.intent.to_string(),
            intent_hash: inputs.intent_hash.to_string(),
            execute_hash: inputs.execute_hash.to_string(),
            core_decision: Decision::Permit,
            authority_key_id: inputs.authority_key_id.map(str::to_string),
            core_issued_at: inputs.core_issued_at.map(str::to_string),
            core_expires_at: inputs.core_expires_at.map(str::to_string),
            core_time: inputs.core_time.map(str::to_string),
            issued_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            expires_at: expires.to_rfc3339_opts(SecondsFormat::Millis, true),
            signature: None,
        };

        // Signature base: the receipt without its signature field.
        let base = canonical_bytes(&serde_json::to_value(&receipt)?)?;
        let signature = self.signing_key.sign(&base);
        receipt.signature = Some(BASE64.encode(signature.to_bytes()));
        Ok(receipt)
    }
}

// =============================================================================
// Verification
// =============================================================================

/// Why a receipt failed verification. `code()` is the wire reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyFailure {
    #[error("no receipt public key configured")]
    MissingReceiptPublicKey,
    #[error("unsupported receipt schema version")]
    InvalidReceiptVersion,
    #[error("receipt does not attest a PERMIT")]
    ReceiptNotPermit,
    #[error("receipt carries no signature")]
    MissingReceiptSignature,
    #[error("receipt time fields are missing or unparseable")]
    InvalidReceiptTimeFields,
    #[error("receipt validity window has not started")]
    ReceiptNotYetValid,
    #[error("receipt validity window has passed")]
    ReceiptExpired,
    #[error("receipt signature does not verify")]
    InvalidReceiptSignature,
}

impl VerifyFailure {
    pub fn code(self) -> &'static str {
        match self {
            VerifyFailure::MissingReceiptPublicKey => "missing_receipt_public_key",
            VerifyFailure::InvalidReceiptVersion => "invalid_receipt_version",
            VerifyFailure::ReceiptNotPermit => "receipt_not_permit",
            VerifyFailure::MissingReceiptSignature => "missing_receipt_signature",
            VerifyFailure::InvalidReceiptTimeFields => "invalid_receipt_time_fields",
            VerifyFailure::ReceiptNotYetValid => "receipt_not_yet_valid",
            VerifyFailure::ReceiptExpired => "receipt_expired",
            VerifyFailure::InvalidReceiptSignature => "invalid_receipt_signature",
        }
    }
}

/// Verify a receipt as received on the wire.
///
/// `receipt` is the raw JSON object (not the typed struct) so the signature
/// check runs over exactly the fields that were transmitted. The skew is
/// applied symmetrically around the validity window.
pub fn verify_receipt(
    receipt: &Value,
    public_key: Option<&VerifyingKey>,
    now: DateTime<Utc>,
    clock_skew_seconds: i64,
) -> Result<(), VerifyFailure> {
    let public_key = public_key.ok_or(VerifyFailure::MissingReceiptPublicKey)?;

    if receipt.get("v").and_then(Value::as_u64) != Some(u64::from(RECEIPT_SCHEMA_VERSION)) {
        return Err(VerifyFailure::InvalidReceiptVersion);
    }

    if receipt.get("coreDecision").and_then(Value::as_str) != Some("PERMIT") {
        return Err(VerifyFailure::ReceiptNotPermit);
    }

    let signature_b64 = receipt
        .get("signature")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(VerifyFailure::MissingReceiptSignature)?;

    let issued_at = parse_time_field(receipt, "issuedAt")?;
    let expires_at = parse_time_field(receipt, "expiresAt")?;

    let skew = Duration::seconds(clock_skew_seconds);
    if now + skew < issued_at {
        return Err(VerifyFailure::ReceiptNotYetValid);
    }
    if now - skew > expires_at {
        return Err(VerifyFailure::ReceiptExpired);
    }

    let mut unsigned = receipt.clone();
    if let Some(map) = unsigned.as_object_mut() {
        map.remove("signature");
    }
    let base =
        canonical_bytes(&unsigned).map_err(|_| VerifyFailure::InvalidReceiptSignature)?;

    let signature_bytes = BASE64
        .decode(signature_b64)
        .map_err(|_| VerifyFailure::InvalidReceiptSignature)?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|_| VerifyFailure::InvalidReceiptSignature)?;

    public_key
        .verify(&base, &signature)
        .map_err(|_| VerifyFailure::InvalidReceiptSignature)
}

fn parse_time_field(receipt: &Value, field: &str) -> Result<DateTime<Utc>, VerifyFailure> {
    receipt
        .get(field)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok_or(VerifyFailure::InvalidReceiptTimeFields)
}
