// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use piying_collector::config::Config;
use piying_collector::models::Submission;
use piying_collector::routes::create_router;
use piying_collector::services::{CredentialCache, DeliveryOutcome, FeishuClient, Transport};
use piying_collector::AppState;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-process stand-in for the Feishu Open API.
#[derive(Default)]
pub struct FakeFeishu {
    pub token_calls: AtomicUsize,
    pub record_calls: AtomicUsize,
    /// `(authorization header, fields)` of every record request
    pub records: Mutex<Vec<(String, Value)>>,
    /// When set, token exchange answers with this payload instead
    pub token_failure: Mutex<Option<Value>>,
    /// Scripted record responses, used before falling back to success
    pub record_responses: Mutex<VecDeque<(u16, Value)>>,
    /// Lifetime advertised by successful token exchanges (7200 when unset)
    pub token_expire: Mutex<Option<i64>>,
    /// When set, every request hangs instead of answering
    pub stalled: AtomicBool,
}

#[allow(dead_code)]
impl FakeFeishu {
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn record_calls(&self) -> usize {
        self.record_calls.load(Ordering::SeqCst)
    }

    pub fn recorded_fields(&self) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(_, fields)| fields.clone())
            .collect()
    }

    pub fn recorded_auth(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(auth, _)| auth.clone())
            .collect()
    }

    pub fn fail_token_exchange(&self, payload: Value) {
        *self.token_failure.lock().unwrap() = Some(payload);
    }

    pub fn set_token_expire(&self, expire: i64) {
        *self.token_expire.lock().unwrap() = Some(expire);
    }

    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn script_record_response(&self, status: u16, payload: Value) {
        self.record_responses
            .lock()
            .unwrap()
            .push_back((status, payload));
    }
}

/// Hang long past any client timeout used in tests.
async fn hang() {
    tokio::time::sleep(Duration::from_secs(60)).await;
}

async fn fake_token(State(fake): State<Arc<FakeFeishu>>) -> (StatusCode, Json<Value>) {
    let n = fake.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if fake.stalled.load(Ordering::SeqCst) {
        hang().await;
    }

    if let Some(payload) = fake.token_failure.lock().unwrap().clone() {
        return (StatusCode::OK, Json(payload));
    }

    (
        StatusCode::OK,
        Json(json!({
            "code": 0,
            "msg": "ok",
            "tenant_access_token": format!("t-{}", n),
            "expire": fake.token_expire.lock().unwrap().unwrap_or(7200)
        })),
    )
}

async fn fake_create_record(
    State(fake): State<Arc<FakeFeishu>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    fake.record_calls.fetch_add(1, Ordering::SeqCst);
    if fake.stalled.load(Ordering::SeqCst) {
        hang().await;
    }

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if let Some((status, payload)) = fake.record_responses.lock().unwrap().pop_front() {
        return (StatusCode::from_u16(status).unwrap(), Json(payload));
    }

    let fields = body["fields"].clone();
    fake.records.lock().unwrap().push((auth, fields.clone()));

    (
        StatusCode::OK,
        Json(json!({
            "code": 0,
            "msg": "success",
            "data": { "record": { "record_id": "recTest0001", "fields": fields } }
        })),
    )
}

/// A collect endpoint that accepts connections and never answers.
#[allow(dead_code)]
pub async fn spawn_stalled_endpoint() -> String {
    let app = Router::new().route(
        "/api/collect",
        post(|| async {
            hang().await;
            StatusCode::OK
        }),
    );
    let addr = serve(app).await;
    format!("http://{}/api/collect", addr)
}

/// Serve a router on an ephemeral localhost port.
#[allow(dead_code)]
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a fake Feishu server and return its API base URL.
#[allow(dead_code)]
pub async fn spawn_fake_feishu() -> (Arc<FakeFeishu>, String) {
    let fake = Arc::new(FakeFeishu::default());
    let app = Router::new()
        .route(
            "/open-apis/auth/v3/tenant_access_token/internal",
            post(fake_token),
        )
        .route(
            "/open-apis/bitable/v1/apps/{app_token}/tables/{table_id}/records",
            post(fake_create_record),
        )
        .with_state(fake.clone());

    let addr = serve(app).await;
    (fake, format!("http://{}/open-apis", addr))
}

/// A base URL nothing is listening on.
#[allow(dead_code)]
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[allow(dead_code)]
pub fn test_config(feishu_base_url: &str) -> Config {
    Config {
        feishu_base_url: feishu_base_url.to_string(),
        ..Config::default()
    }
}

/// Create a test app talking to the given Feishu base URL.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(feishu_base_url: &str) -> (Router, Arc<AppState>) {
    create_test_app_with_config(test_config(feishu_base_url))
}

#[allow(dead_code)]
pub fn test_state(config: Config) -> Arc<AppState> {
    let feishu = FeishuClient::new(&config, Arc::new(CredentialCache::new())).unwrap();
    Arc::new(AppState { config, feishu })
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (Router, Arc<AppState>) {
    let state = test_state(config);
    (create_router(state.clone()), state)
}

/// Transport that replays scripted outcomes, then a fallback.
#[allow(dead_code)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<DeliveryOutcome>>,
    fallback: Mutex<DeliveryOutcome>,
    attempts: Mutex<Vec<Submission>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new(fallback: DeliveryOutcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Self::new(DeliveryOutcome::Failed {
            reason: "offline".to_string(),
        })
    }

    pub fn delivering() -> Arc<Self> {
        Self::new(DeliveryOutcome::Delivered)
    }

    pub fn push(&self, outcome: DeliveryOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn set_fallback(&self, outcome: DeliveryOutcome) {
        *self.fallback.lock().unwrap() = outcome;
    }

    pub fn attempts(&self) -> Vec<Submission> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    async fn deliver(&self, submission: &Submission) -> DeliveryOutcome {
        self.attempts.lock().unwrap().push(submission.clone());
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}
