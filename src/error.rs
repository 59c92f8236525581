// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Every failure is rendered as a tagged `{ok: false, step, ...}` body so the
//! game client can tell "rejected, do not retry" apart from "not delivered,
//! retry later" without inspecting status codes.

use crate::models::RemoteFields;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid JSON: {0}")]
    BadRequest(String),

    #[error("Missing identity fields (name/grade/class)")]
    MissingIdentity,

    #[error("Feishu token exchange failed: {payload}")]
    TokenExchange { payload: Value },

    #[error("Feishu rejected record: {payload}")]
    RemoteRejected {
        payload: Value,
        fields: Option<RemoteFields>,
    },

    #[error("Feishu unreachable: {message}")]
    Transport {
        message: String,
        fields: Option<RemoteFields>,
    },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn remote_rejected(payload: Value) -> Self {
        AppError::RemoteRejected {
            payload,
            fields: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        AppError::Transport {
            message: message.into(),
            fields: None,
        }
    }

    /// Attach the record that was being written, echoed back in the body.
    pub fn with_fields(mut self, record: &RemoteFields) -> Self {
        if let AppError::RemoteRejected { fields, .. } | AppError::Transport { fields, .. } =
            &mut self
        {
            *fields = Some(record.clone());
        }
        self
    }

    /// Pipeline step the failure belongs to.
    pub fn step(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "parse",
            AppError::MissingIdentity => "validate",
            AppError::TokenExchange { .. } => "get_token",
            AppError::RemoteRejected { .. } => "create_record",
            AppError::Transport { .. } => "transport",
            AppError::Internal(_) => "internal",
        }
    }

    /// Whether resending the same body could succeed later.
    ///
    /// Validation failures and remote rejections would fail identically.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AppError::BadRequest(_) | AppError::MissingIdentity | AppError::RemoteRejected { .. }
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            // Client mistakes are answered with 200.
            AppError::BadRequest(_) | AppError::MissingIdentity => StatusCode::OK,
            AppError::TokenExchange { .. } | AppError::RemoteRejected { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Transport { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body returned by the collect endpoint, on success and on failure.
#[derive(Debug, Default, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CollectResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Raw Feishu payload
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "unknown"))]
    pub feishu: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The five columns that were (or would have been) written
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "Record<string, unknown>"))]
    pub fields: Option<Value>,
    /// Expected request shape, sent with validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "Record<string, unknown>"))]
    pub example: Option<Value>,
    pub retryable: bool,
}

/// Example flat body returned with validation failures.
pub fn example_body() -> Value {
    serde_json::json!({
        "name": "小明",
        "grade": "六年级",
        "class": "3班",
        "l3_moves": 8,
        "v_seen": true
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = CollectResponse {
            ok: false,
            step: Some(self.step().to_string()),
            retryable: self.is_retryable(),
            ..Default::default()
        };

        match &self {
            AppError::BadRequest(msg) => {
                tracing::debug!(error = %msg, "Rejected malformed body");
                body.message = Some("Invalid JSON".to_string());
                body.error = Some(msg.clone());
            }
            AppError::MissingIdentity => {
                body.message = Some("missing_identity".to_string());
                body.error = Some(self.to_string());
                body.example = Some(example_body());
            }
            AppError::TokenExchange { payload } => {
                tracing::error!(feishu = %payload, "Token exchange failed");
                body.message = Some("get_token_failed".to_string());
                body.feishu = Some(payload.clone());
            }
            AppError::RemoteRejected { payload, fields } => {
                tracing::warn!(feishu = %payload, "Record rejected by Feishu");
                body.message = Some("feishu_create_failed".to_string());
                body.feishu = Some(payload.clone());
                body.fields = fields.as_ref().and_then(|f| serde_json::to_value(f).ok());
            }
            AppError::Transport { message, fields } => {
                body.message = Some("feishu_api_error".to_string());
                body.error = Some(message.clone());
                body.fields = fields.as_ref().and_then(|f| serde_json::to_value(f).ok());
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                body.message = Some("internal_error".to_string());
            }
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_tagged() {
        assert_eq!(AppError::BadRequest("x".into()).step(), "parse");
        assert_eq!(AppError::MissingIdentity.step(), "validate");
        assert_eq!(
            AppError::TokenExchange {
                payload: Value::Null
            }
            .step(),
            "get_token"
        );
        assert_eq!(
            AppError::remote_rejected(Value::Null).step(),
            "create_record"
        );
        assert_eq!(AppError::transport("x").step(), "transport");
    }

    #[test]
    fn test_client_errors_use_success_status() {
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::OK);
        assert_eq!(AppError::MissingIdentity.status(), StatusCode::OK);
        assert_eq!(
            AppError::transport("x").status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_with_fields_only_touches_dispatch_failures() {
        let record = RemoteFields {
            nickname: "小明".to_string(),
            grade: "六年级".to_string(),
            class_name: "3班".to_string(),
            level3_moves: 8,
            video_seen: "是".to_string(),
        };

        match AppError::transport("refused").with_fields(&record) {
            AppError::Transport { fields, .. } => assert_eq!(fields, Some(record.clone())),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            AppError::MissingIdentity.with_fields(&record),
            AppError::MissingIdentity
        ));
    }
}
