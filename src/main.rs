// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Piying-Collector API Server
//!
//! Receives game-completion records from the shadow-puppet quest and appends
//! them to a Feishu Bitable.

use anyhow::Context;
use piying_collector::{
    config::Config,
    services::{CredentialCache, FeishuClient},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        port = config.port,
        table_id_tail = %Config::tail(&config.feishu_table_id),
        app_token_tail = %Config::tail(&config.feishu_app_token),
        "Starting Piying-Collector API"
    );

    // One credential cache for the lifetime of the process
    let credentials = Arc::new(CredentialCache::new());
    let feishu = FeishuClient::new(&config, credentials)?;
    tracing::info!(base_url = %config.feishu_base_url, "Feishu client initialized");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        feishu,
    });

    // Build router
    let app = piying_collector::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("piying_collector=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
