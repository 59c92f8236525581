// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Piying-Collector: game-completion records for the shadow-puppet quest
//!
//! This crate provides the ingestion endpoint that normalizes submitted
//! records and appends them to a Feishu Bitable, plus the client-side
//! submission agent that delivers records with a durable retry queue.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::FeishuClient;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub feishu: FeishuClient,
}
