// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Submission delivery from the game client to the collect endpoint.

use crate::config::AgentConfig;
use crate::models::Submission;
use anyhow::Context;
use reqwest::StatusCode;
use serde::Deserialize;
use std::future::Future;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint confirmed the record was written.
    Delivered,
    /// The endpoint answered and refused the record for good.
    Rejected { reason: String },
    /// Not delivered; worth retrying later.
    Failed { reason: String },
}

impl DeliveryOutcome {
    /// Only transient failures go to the retry queue.
    pub fn should_queue(&self) -> bool {
        matches!(self, DeliveryOutcome::Failed { .. })
    }
}

/// Something that can carry a submission to the endpoint.
///
/// Implementations never error: every problem is folded into the outcome.
pub trait Transport: Send + Sync {
    fn deliver(&self, submission: &Submission) -> impl Future<Output = DeliveryOutcome> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn deliver(&self, submission: &Submission) -> impl Future<Output = DeliveryOutcome> + Send {
        (**self).deliver(submission)
    }
}

/// HTTP transport posting JSON to the collect endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &AgentConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed building submission HTTP client")?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl Transport for HttpTransport {
    async fn deliver(&self, submission: &Submission) -> DeliveryOutcome {
        let response = match self.http.post(&self.endpoint).json(submission).send().await {
            Ok(r) => r,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("request timed out: {}", e)
                } else {
                    format!("request failed: {}", e)
                };
                tracing::debug!(reason = %reason, "Submission not delivered");
                return DeliveryOutcome::Failed { reason };
            }
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => classify_response(status, &body),
            Err(e) => DeliveryOutcome::Failed {
                reason: format!("failed reading response: {}", e),
            },
        }
    }
}

/// Subset of the endpoint's response the client cares about.
#[derive(Debug, Deserialize)]
struct CollectAck {
    ok: bool,
    step: Option<String>,
    message: Option<String>,
    retryable: Option<bool>,
}

/// Classify an endpoint response.
///
/// An explicit `retryable` flag wins. Without one, a non-2xx status is
/// treated as transient and an `ok:false` body with a 2xx status as final.
pub fn classify_response(status: StatusCode, body: &str) -> DeliveryOutcome {
    let Ok(ack) = serde_json::from_str::<CollectAck>(body) else {
        return if status.is_success() {
            DeliveryOutcome::Delivered
        } else {
            DeliveryOutcome::Failed {
                reason: format!("HTTP {}", status),
            }
        };
    };

    if ack.ok && status.is_success() {
        return DeliveryOutcome::Delivered;
    }

    let reason = format!(
        "HTTP {} step={} {}",
        status,
        ack.step.as_deref().unwrap_or("-"),
        ack.message.as_deref().unwrap_or("")
    )
    .trim_end()
    .to_string();

    match ack.retryable {
        Some(false) => DeliveryOutcome::Rejected { reason },
        Some(true) => DeliveryOutcome::Failed { reason },
        None if status.is_success() => DeliveryOutcome::Rejected { reason },
        None => DeliveryOutcome::Failed { reason },
    }
}
