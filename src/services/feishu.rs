// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Feishu Bitable client for appending game records.
//!
//! Handles:
//! - Tenant access token exchange (app id + secret)
//! - In-memory credential caching with a refresh margin
//! - Record creation in the configured table
//! - Translating remote responses into tagged [`AppError`] variants

use crate::config::Config;
use crate::error::AppError;
use crate::models::RemoteFields;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default Feishu Open API root.
pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn/open-apis";

/// Default upper bound on any single call to Feishu.
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

const TOKEN_PATH: &str = "/auth/v3/tenant_access_token/internal";

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Longest token lifetime we trust from the exchange response (24 hours).
const MAX_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Feishu codes meaning the tenant token is invalid or expired.
const STALE_TOKEN_CODES: [i64; 3] = [99991663, 99991664, 99991668];

// ─────────────────────────────────────────────────────────────────────────────
// CredentialCache
// ─────────────────────────────────────────────────────────────────────────────

/// Cached tenant access token with expiry information.
#[derive(Debug, Clone)]
pub struct CachedCredential {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedCredential {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Usable at `now` only if it outlives the refresh margin.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Process-wide holder for the tenant access token.
///
/// Created once by the composition root and shared through `AppState`.
/// Concurrent refreshes are not serialized; each stores its own token.
#[derive(Debug, Default)]
pub struct CredentialCache {
    current: RwLock<Option<CachedCredential>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token, if one exists and is not about to expire.
    pub async fn get_valid(&self) -> Option<String> {
        let now = Utc::now();
        self.current
            .read()
            .await
            .as_ref()
            .filter(|cached| cached.is_valid_at(now))
            .map(|cached| cached.access_token.clone())
    }

    pub async fn store(&self, credential: CachedCredential) {
        *self.current.write().await = Some(credential);
    }

    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    pub async fn current(&self) -> Option<CachedCredential> {
        self.current.read().await.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FeishuClient
// ─────────────────────────────────────────────────────────────────────────────

/// Bitable API client bound to one app table.
#[derive(Clone)]
pub struct FeishuClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    app_token: String,
    table_id: String,
    credentials: Arc<CredentialCache>,
}

impl FeishuClient {
    /// Create a client for the table named in `config`.
    pub fn new(config: &Config, credentials: Arc<CredentialCache>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.feishu_request_timeout)
            .build()
            .context("failed building Feishu HTTP client")?;

        Ok(Self {
            http,
            base_url: config.feishu_base_url.trim_end_matches('/').to_string(),
            app_id: config.feishu_app_id.clone(),
            app_secret: config.feishu_app_secret.clone(),
            app_token: config.feishu_app_token.clone(),
            table_id: config.feishu_table_id.clone(),
            credentials,
        })
    }

    /// Append one record to the table.
    ///
    /// Returns the remote success payload. A stale-token answer invalidates
    /// the cache and the append is retried once with a fresh token.
    pub async fn append_record(&self, fields: &RemoteFields) -> Result<Value, AppError> {
        let token = self.tenant_access_token().await?;

        match self.create_record(&token, fields).await? {
            CreateOutcome::Created(payload) => Ok(payload),
            CreateOutcome::StaleToken(payload) => {
                let code = payload.get("code").and_then(Value::as_i64);
                tracing::info!(code, "Cached tenant token rejected, refreshing");
                self.credentials.invalidate().await;
                let token = self.tenant_access_token().await?;

                match self.create_record(&token, fields).await? {
                    CreateOutcome::Created(payload) => Ok(payload),
                    CreateOutcome::StaleToken(payload) => {
                        Err(AppError::TokenExchange { payload })
                    }
                }
            }
        }
    }

    /// Get a valid tenant access token, exchanging credentials if needed.
    pub async fn tenant_access_token(&self) -> Result<String, AppError> {
        if let Some(token) = self.credentials.get_valid().await {
            return Ok(token);
        }

        let exchanged = self.exchange_credentials().await?;
        let expires_at = token_expiry(Utc::now(), exchanged.expires_in);
        self.credentials
            .store(CachedCredential::new(exchanged.access_token.clone(), expires_at))
            .await;

        tracing::info!(
            expires_in = exchanged.expires_in,
            "Tenant access token refreshed and cached"
        );
        Ok(exchanged.access_token)
    }

    /// Exchange app id + secret for a fresh tenant token.
    async fn exchange_credentials(&self) -> Result<ExchangedToken, AppError> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        let body = serde_json::json!({
            "app_id": self.app_id,
            "app_secret": self.app_secret,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Token exchange request failed", e))?;

        let (status, payload) = read_payload(response).await?;

        let parsed: Option<TokenResponse> = serde_json::from_value(payload.clone()).ok();
        match parsed {
            Some(TokenResponse {
                code: 0,
                tenant_access_token: Some(access_token),
                expire,
            }) if status.is_success() => Ok(ExchangedToken {
                access_token,
                expires_in: expire.unwrap_or(0),
            }),
            _ => {
                tracing::error!(status = %status, "Feishu token exchange failed");
                Err(AppError::TokenExchange { payload })
            }
        }
    }

    /// POST one row to the table.
    async fn create_record(
        &self,
        access_token: &str,
        fields: &RemoteFields,
    ) -> Result<CreateOutcome, AppError> {
        let url = format!(
            "{}/bitable/v1/apps/{}/tables/{}/records",
            self.base_url, self.app_token, self.table_id
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "fields": fields }))
            .send()
            .await
            .map_err(|e| transport_error("Create record request failed", e))?;

        let (status, payload) = read_payload(response).await?;
        let code = payload.get("code").and_then(Value::as_i64);

        if status.is_success() && code == Some(0) {
            return Ok(CreateOutcome::Created(payload));
        }

        if code.is_some_and(|c| STALE_TOKEN_CODES.contains(&c)) {
            return Ok(CreateOutcome::StaleToken(payload));
        }

        tracing::warn!(status = %status, code, "Feishu rejected record");
        Err(AppError::remote_rejected(payload))
    }
}

enum CreateOutcome {
    Created(Value),
    StaleToken(Value),
}

struct ExchangedToken {
    access_token: String,
    expires_in: i64,
}

/// Token exchange response.
///
/// Feishu names the fields `tenant_access_token` / `expire`; the generic
/// `access_token` / `expires_in` spelling is accepted too.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(alias = "access_token")]
    tenant_access_token: Option<String>,
    #[serde(alias = "expires_in")]
    expire: Option<i64>,
}

/// Read a response body as JSON, keeping non-JSON bodies as a string value.
async fn read_payload(response: reqwest::Response) -> Result<(StatusCode, Value), AppError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error("Failed reading Feishu response", e))?;

    let payload = serde_json::from_str(&text).unwrap_or(Value::String(text));
    Ok((status, payload))
}

fn transport_error(context: &str, err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() { "timed out" } else { "failed" };
    tracing::warn!(error = %err, kind, "{}", context);
    AppError::transport(format!("{} ({}): {}", context, kind, err))
}

/// Expiry instant for a token issued at `now` with the advertised lifetime,
/// clamped to `[0, MAX_TOKEN_LIFETIME_SECS]`.
fn token_expiry(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    now + Duration::seconds(expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS))
}
