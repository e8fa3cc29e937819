// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, net::SocketAddr};

use solace_gate::api::router;
use solace_gate::config::GateConfig;
use solace_gate::state::AppState;

/// Install the tracing subscriber.
///
/// `RUST_LOG` controls the filter (default `info`); `LOG_FORMAT=json`
/// switches to structured output for log pipelines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if env::var("LOG_FORMAT").as_deref() == Ok("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    // Fail fast: a partially configured gateway must not serve traffic.
    let config = match GateConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(error = %error, "configuration is incomplete, refusing to start");
            std::process::exit(1);
        }
    };

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(error = %error, "failed to initialize gateway state");
            std::process::exit(1);
        }
    };

    tracing::info!(
        adapter_id = %state.config.adapter_id,
        core = %state.config.core.base_url,
        targets = state.config.targets.len(),
        "gateway configured"
    );

    let app = router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    tracing::info!(%addr, "Solace Gate listening (docs at /docs)");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    axum::serve(listener, app.into_make_service())
        .await
        .expect("Server failed");
}
