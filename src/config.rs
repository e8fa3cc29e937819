// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Gateway configuration is loaded from the environment once at startup and
//! is immutable afterwards. Any missing required key aborts startup; the
//! process must never serve traffic partially configured.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ADAPTER_ID` | Stable gateway identity stamped into receipts | Required |
//! | `RECEIPT_PRIVATE_KEY_PEM` | Ed25519 PKCS8 PEM (inline) | Required* |
//! | `RECEIPT_PRIVATE_KEY_PATH` | Path to the PKCS8 PEM file | Required* |
//! | `RECEIPT_PUBLIC_KEY_PEM` | Ed25519 SPKI PEM (inline) | Required* |
//! | `RECEIPT_PUBLIC_KEY_PATH` | Path to the SPKI PEM file | Required* |
//! | `RECEIPT_TTL_SECONDS` | Receipt validity window | `30` |
//! | `CLOCK_SKEW_SECONDS` | Symmetric verification skew | `10` |
//! | `CORE_BASE_URL` | Decision service base URL | Required |
//! | `CORE_TIMEOUT_MS` | Core (and forward) deadline | `8000` |
//! | `CORE_HEADERS` | JSON object of static Core headers | `{}` |
//! | `FORWARD_TARGETS` | JSON object: service → `{url, bearerToken?}` | Required |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |
//! | `CORS_ALLOWED_ORIGINS` | Comma-separated allowlist | permissive |
//!
//! *one of the inline/path pair must be set.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::receipt::{signing_key_from_pem, verifying_key_from_pem};
use crate::routing::ForwardTarget;

pub const ADAPTER_ID_ENV: &str = "ADAPTER_ID";
pub const RECEIPT_PRIVATE_KEY_PEM_ENV: &str = "RECEIPT_PRIVATE_KEY_PEM";
pub const RECEIPT_PRIVATE_KEY_PATH_ENV: &str = "RECEIPT_PRIVATE_KEY_PATH";
pub const RECEIPT_PUBLIC_KEY_PEM_ENV: &str = "RECEIPT_PUBLIC_KEY_PEM";
pub const RECEIPT_PUBLIC_KEY_PATH_ENV: &str = "RECEIPT_PUBLIC_KEY_PATH";
pub const RECEIPT_TTL_SECONDS_ENV: &str = "RECEIPT_TTL_SECONDS";
pub const CLOCK_SKEW_SECONDS_ENV: &str = "CLOCK_SKEW_SECONDS";
pub const CORE_BASE_URL_ENV: &str = "CORE_BASE_URL";
pub const CORE_TIMEOUT_MS_ENV: &str = "CORE_TIMEOUT_MS";
pub const CORE_HEADERS_ENV: &str = "CORE_HEADERS";
pub const FORWARD_TARGETS_ENV: &str = "FORWARD_TARGETS";

const DEFAULT_RECEIPT_TTL_SECONDS: i64 = 30;
const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 10;
const DEFAULT_CORE_TIMEOUT_MS: u64 = 8000;

/// Startup configuration failure. Fatal by design.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingVar(&'static str),

    #[error("invalid configuration value for {name}: {message}")]
    InvalidVar { name: &'static str, message: String },

    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },

    #[error("receipt key self-check failed: {0}")]
    KeySelfCheck(String),
}

/// Connection settings for the external decision service.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Base URL; decision requests go to `{base_url}/v1/execute`.
    pub base_url: String,
    /// Single deadline covering the whole Core round trip.
    pub timeout: Duration,
    /// Static headers merged into every Core request.
    pub headers: HashMap<String, String>,
}

/// Full gateway configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub adapter_id: String,
    pub receipt_private_key_pem: String,
    pub receipt_public_key_pem: String,
    pub receipt_ttl_seconds: i64,
    pub clock_skew_seconds: i64,
    pub core: CoreConfig,
    pub targets: HashMap<String, ForwardTarget>,
}

impl GateConfig {
    /// Load configuration from the environment, failing fast on any gap.
    pub fn from_env() -> Result<GateConfig, ConfigError> {
        let adapter_id = env_required(ADAPTER_ID_ENV)?;
        let receipt_private_key_pem =
            pem_inline_or_path(RECEIPT_PRIVATE_KEY_PEM_ENV, RECEIPT_PRIVATE_KEY_PATH_ENV)?;
        let receipt_public_key_pem =
            pem_inline_or_path(RECEIPT_PUBLIC_KEY_PEM_ENV, RECEIPT_PUBLIC_KEY_PATH_ENV)?;

        let receipt_ttl_seconds =
            env_parsed(RECEIPT_TTL_SECONDS_ENV, DEFAULT_RECEIPT_TTL_SECONDS)?;
        let clock_skew_seconds = env_parsed(CLOCK_SKEW_SECONDS_ENV, DEFAULT_CLOCK_SKEW_SECONDS)?;

        let core = CoreConfig {
            base_url: env_required(CORE_BASE_URL_ENV)?
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_millis(env_parsed(
                CORE_TIMEOUT_MS_ENV,
                DEFAULT_CORE_TIMEOUT_MS,
            )?),
            headers: env_json_map(CORE_HEADERS_ENV)?.unwrap_or_default(),
        };

        let targets: HashMap<String, ForwardTarget> = {
            let raw = env_required(FORWARD_TARGETS_ENV)?;
            serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidVar {
                name: FORWARD_TARGETS_ENV,
                message: e.to_string(),
            })?
        };
        if targets.is_empty() {
            return Err(ConfigError::InvalidVar {
                name: FORWARD_TARGETS_ENV,
                message: "target table must not be empty".to_string(),
            });
        }

        let config = GateConfig {
            adapter_id,
            receipt_private_key_pem,
            receipt_public_key_pem,
            receipt_ttl_seconds,
            clock_skew_seconds,
            core,
            targets,
        };
        config.self_check()?;
        Ok(config)
    }

    /// Verify the configured keypair actually belongs together.
    ///
    /// Catches a stale or mismatched public PEM at startup instead of
    /// shipping receipts no executor can verify.
    pub fn self_check(&self) -> Result<(), ConfigError> {
        let signing_key = signing_key_from_pem(&self.receipt_private_key_pem)
            .map_err(|e| ConfigError::KeySelfCheck(e.to_string()))?;
        let verifying_key = verifying_key_from_pem(&self.receipt_public_key_pem)
            .map_err(|e| ConfigError::KeySelfCheck(e.to_string()))?;
        if signing_key.verifying_key() != verifying_key {
            return Err(ConfigError::KeySelfCheck(
                "public key does not match the private key".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            name,
            message: e.to_string(),
        }),
    }
}

fn env_json_map(name: &'static str) -> Result<Option<HashMap<String, String>>, ConfigError> {
    match env_optional(name) {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidVar {
                name,
                message: e.to_string(),
            }),
    }
}

/// Resolve PEM material from an inline variable or a file path fallback.
fn pem_inline_or_path(
    inline_env: &'static str,
    path_env: &'static str,
) -> Result<String, ConfigError> {
    if let Some(inline) = env_optional(inline_env) {
        return Ok(inline);
    }
    if let Some(path) = env_optional(path_env) {
        return std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::KeyFile { path, source });
    }
    Err(ConfigError::MissingVar(inline_env))
}
