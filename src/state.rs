// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Application State
//!
//! Shared state handed to every request handler via Axum's `State`
//! extractor.
//!
//! ## Thread Safety
//!
//! `AppState` is `Clone` and `Send + Sync`. Everything inside is built once
//! at startup and read-only afterwards: the configuration, the parsed
//! signing key, and the two HTTP clients (which share connection pools
//! internally). Request handling never mutates state: there is no decision
//! cache, no receipt store, no queue.

use std::sync::Arc;

use thiserror::Error;

use crate::config::GateConfig;
use crate::core_client::{CoreClient, CoreClientError};
use crate::forward::Forwarder;
use crate::receipt::{ReceiptError, ReceiptSigner};

/// Failure to assemble state from an otherwise loaded configuration.
/// Fatal at startup, like `ConfigError`.
#[derive(Debug, Error)]
pub enum StateInitError {
    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    #[error(transparent)]
    Core(#[from] CoreClientError),

    #[error("failed to build forward HTTP client: {0}")]
    Forwarder(#[from] reqwest::Error),
}

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Immutable gateway configuration.
    pub config: Arc<GateConfig>,
    /// Receipt minter holding the parsed Ed25519 signing key.
    pub signer: Arc<ReceiptSigner>,
    /// Client for the external decision service.
    pub core: CoreClient,
    /// Client for executor delivery.
    pub forwarder: Forwarder,
}

impl AppState {
    /// Build state from a loaded configuration.
    ///
    /// Parses key material and constructs the HTTP clients; any failure
    /// here must abort startup.
    pub fn new(config: GateConfig) -> Result<AppState, StateInitError> {
        let signer = ReceiptSigner::new(
            config.adapter_id.clone(),
            &config.receipt_private_key_pem,
            config.receipt_ttl_seconds,
        )?;
        let core = CoreClient::new(&config.core)?;
        // The forward deadline defaults to the Core deadline.
        let forwarder = Forwarder::new(config.core.timeout)?;

        Ok(AppState {
            config: Arc::new(config),
            signer: Arc::new(signer),
            core,
            forwarder,
        })
    }
}
