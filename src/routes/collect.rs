// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Record ingestion route.
//!
//! One path serves the whole collector surface:
//! - `GET` reports which table is configured (identifier tails only)
//! - `POST` normalizes a record and appends it to Bitable
//! - `OPTIONS` preflights are answered by the CORS layer before routing
//! - anything else is refused with "Use POST"

use crate::config::Config;
use crate::error::{AppError, CollectResponse, Result};
use crate::services::normalize::{normalize, NormalizeError};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Path the game client posts to.
pub const COLLECT_PATH: &str = "/api/collect";

/// Collect routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        COLLECT_PATH,
        get(health).post(collect).fallback(use_post),
    )
}

/// Health probe body.
#[derive(Serialize)]
struct CollectHealth {
    ok: bool,
    message: &'static str,
    seen: SeenConfig,
}

/// Configured identifiers, truncated so secrets never leave the server.
#[derive(Serialize)]
struct SeenConfig {
    token_mode: &'static str,
    table_id_tail: String,
    app_token_tail: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<CollectHealth> {
    Json(CollectHealth {
        ok: true,
        message: "health ok",
        seen: SeenConfig {
            token_mode: "app-id-secret",
            table_id_tail: Config::tail(&state.config.feishu_table_id),
            app_token_tail: Config::tail(&state.config.feishu_app_token),
        },
    })
}

async fn use_post() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(CollectResponse {
            ok: false,
            message: Some("Use POST".to_string()),
            ..Default::default()
        }),
    )
}

/// Normalize a submitted record and append it to the table.
async fn collect(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<CollectResponse>> {
    let value = parse_body(&body)?;

    let normalized = normalize(&value).map_err(|e| match e {
        NormalizeError::NotAnObject => AppError::BadRequest(e.to_string()),
    })?;

    if !normalized.record.has_any_identity() {
        tracing::info!(shape = normalized.shape.as_str(), "Record without identity fields");
        return Err(AppError::MissingIdentity);
    }

    let fields = normalized.record.to_remote_fields();
    tracing::info!(
        shape = normalized.shape.as_str(),
        level3_moves = fields.level3_moves,
        video_seen = %fields.video_seen,
        "Appending record"
    );

    let payload = state
        .feishu
        .append_record(&fields)
        .await
        .map_err(|e| e.with_fields(&fields))?;

    let record_id = payload
        .pointer("/data/record/record_id")
        .and_then(Value::as_str)
        .unwrap_or("");
    tracing::info!(record_id, "Record created");

    Ok(Json(CollectResponse {
        ok: true,
        step: Some("create_record".to_string()),
        msg: Some("success".to_string()),
        feishu: Some(payload),
        fields: serde_json::to_value(&fields).ok(),
        ..Default::default()
    }))
}

/// Parse the raw body; an empty body is treated as `{}`.
fn parse_body(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body_empty_is_object() {
        assert_eq!(parse_body(b"").unwrap(), serde_json::json!({}));
        assert_eq!(parse_body(b"  \n").unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_parse_body_malformed() {
        assert!(matches!(
            parse_body(b"{\"name\": "),
            Err(AppError::BadRequest(_))
        ));
    }
}
