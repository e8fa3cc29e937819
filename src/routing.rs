// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Action Routing
//!
//! Maps an envelope's `execute.action` onto a configured executor. Actions
//! use the `"<service>:<operation>"` form; the service half selects the
//! forward target, the operation half is the executor's business.
//!
//! Routing is static: the target table is loaded once at startup and never
//! mutated. There is no discovery and no fallback target.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::reason;

/// A configured executor endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardTarget {
    /// Absolute URL the execute payload is POSTed to.
    pub url: String,
    /// Optional bearer token attached to forwarded requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

/// An `execute.action` split into its two halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    pub service: String,
    pub operation: String,
}

/// Routing failures, surfaced to clients as DENY reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("execute.action is missing or not of the form service:operation")]
    InvalidActionFormat,
    #[error("no forward target configured for the requested service")]
    UnknownForwardTarget,
}

impl RouteError {
    pub fn code(self) -> &'static str {
        match self {
            RouteError::InvalidActionFormat => reason::INVALID_ACTION_FORMAT,
            RouteError::UnknownForwardTarget => reason::UNKNOWN_FORWARD_TARGET,
        }
    }
}

/// Parse `execute.action` into service and operation.
///
/// Both halves must be non-empty after trimming; everything else (including
/// a missing or non-string `action`) is `InvalidActionFormat`.
pub fn parse_action(execute: &Value) -> Result<ParsedAction, RouteError> {
    let action = execute
        .get("action")
        .and_then(Value::as_str)
        .ok_or(RouteError::InvalidActionFormat)?;

    let (service, operation) = action.split_once(':').ok_or(RouteError::InvalidActionFormat)?;
    let service = service.trim();
    let operation = operation.trim();
    if service.is_empty() || operation.is_empty() {
        return Err(RouteError::InvalidActionFormat);
    }

    Ok(ParsedAction {
        service: service.to_string(),
        operation: operation.to_string(),
    })
}

/// Look a service up in the target table.
pub fn resolve<'a>(
    targets: &'a HashMap<String, ForwardTarget>,
    service: &str,
) -> Result<&'a ForwardTarget, RouteError> {
    targets.get(service).ok_or(RouteError::UnknownForwardTarget)
}
