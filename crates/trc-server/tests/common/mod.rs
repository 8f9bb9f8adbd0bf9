//! Shared harness for server integration tests.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;
use trc_bridge::protocol::{RunnerResult, ServerMessage};
use trc_bridge::{BLOCKED_ASK_STDERR, BLOCKED_DENY_STDERR};
use trc_config::CoreConfig;
use trc_policy::CommandClass;
use trc_provider::{MockProvider, Provider, ProviderFactory};
use trc_server::artifacts::ArtifactStore;
use trc_server::{build_app, AppState};
use trc_store::{ApiKeyIdentity, Store};
use uuid::Uuid;

/// The API key every test authenticates with.
pub const TOKEN: &str = "sk-test-token";

/// A built server plus its state, with artifacts on a temp dir.
pub struct TestHarness {
    pub state: Arc<AppState>,
    pub app: Router,
    _artifacts: tempfile::TempDir,
}

/// Build a harness over the default config.
pub async fn harness() -> TestHarness {
    harness_with(CoreConfig::default()).await
}

/// Build a harness over a custom config. All models route to the mock
/// provider.
pub async fn harness_with(config: CoreConfig) -> TestHarness {
    let store = Store::open_in_memory().await.expect("open store");
    store
        .create_api_key(
            TOKEN,
            &ApiKeyIdentity {
                org_id: "org-1".into(),
                user_id: "user-1".into(),
                billing_plan: "dev".into(),
            },
        )
        .await
        .expect("create api key");

    let mut clients: BTreeMap<String, Arc<dyn Provider>> = BTreeMap::new();
    for name in ["openai", "anthropic", "google", "mock"] {
        clients.insert(name.into(), Arc::new(MockProvider::new()));
    }
    let factory = ProviderFactory::with_clients(config.model_stack.clone(), clients);

    let artifacts = tempfile::tempdir().expect("artifact dir");
    let state = Arc::new(
        AppState::new(store, config, factory, ArtifactStore::new(artifacts.path()))
            .expect("build state"),
    );
    TestHarness {
        app: build_app(state.clone()),
        state,
        _artifacts: artifacts,
    }
}

/// One authenticated request through the router; returns status and parsed
/// body (raw text when the body is not JSON).
pub async fn send(
    app: &Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    };
    let response = app.clone().oneshot(request).await.expect("send request");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

pub async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    send(app, Method::GET, path, Some(TOKEN), None).await
}

pub async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, path, Some(TOKEN), Some(body)).await
}

/// How the scripted runner behaves.
#[derive(Clone)]
pub struct RunnerScript {
    /// What `git rev-parse HEAD` reports.
    pub head: String,
    /// What `git status --porcelain` / `--short` report.
    pub status: String,
    /// Apply the permission floor: refuse `ask` and `deny` commands with the
    /// distinguishable stderr markers.
    pub enforce_floor: bool,
}

impl Default for RunnerScript {
    fn default() -> Self {
        Self {
            head: "DEV".into(),
            status: String::new(),
            enforce_floor: false,
        }
    }
}

/// Register a scripted runner session for a project and answer every bridge
/// request according to the script.
pub async fn attach_runner(state: &Arc<AppState>, project_id: Uuid, script: RunnerScript) {
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);
    state
        .registry
        .register(project_id, "org-1".into(), "user-1".into(), tx)
        .await;
    let registry = state.registry.clone();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let (request_id, session_id, exit_code, stdout, stderr) = match &message {
                ServerMessage::Exec {
                    request_id,
                    runner_session_id,
                    command,
                    permission_class,
                    ..
                } => {
                    let (code, out, err) = script.answer_exec(command, *permission_class);
                    (*request_id, *runner_session_id, code, out, err)
                }
                ServerMessage::Read {
                    request_id,
                    runner_session_id,
                    ..
                } => (
                    *request_id,
                    *runner_session_id,
                    0,
                    "fn main() {}\n".to_string(),
                    String::new(),
                ),
                ServerMessage::Grep {
                    request_id,
                    runner_session_id,
                    ..
                }
                | ServerMessage::List {
                    request_id,
                    runner_session_id,
                    ..
                }
                | ServerMessage::Write {
                    request_id,
                    runner_session_id,
                    ..
                } => (
                    *request_id,
                    *runner_session_id,
                    0,
                    String::new(),
                    String::new(),
                ),
                ServerMessage::HelloAck { .. } => continue,
            };
            registry
                .dispatch_result(
                    project_id,
                    RunnerResult {
                        request_id,
                        runner_session_id: session_id,
                        exit_code,
                        stdout,
                        stderr,
                        duration_ms: 3,
                    },
                )
                .await;
        }
    });
}

impl RunnerScript {
    fn answer_exec(&self, command: &str, class: CommandClass) -> (i32, String, String) {
        if self.enforce_floor {
            match class {
                CommandClass::Deny => {
                    return (1, String::new(), BLOCKED_DENY_STDERR.to_string());
                }
                CommandClass::Ask => {
                    return (1, String::new(), BLOCKED_ASK_STDERR.to_string());
                }
                CommandClass::Allow => {}
            }
        }
        if command.starts_with("git rev-parse HEAD") {
            return (0, format!("{}\n", self.head), String::new());
        }
        if command.starts_with("git status") {
            return (0, self.status.clone(), String::new());
        }
        (0, String::new(), String::new())
    }
}

/// Connect + plan + approve; returns the project id.
pub async fn project_with_approved_plan(app: &Router, tasks_document: Option<Value>) -> Uuid {
    let (status, body) = post(
        app,
        "/v1/projects/connect",
        serde_json::json!({ "repo_name": "trcoder", "repo_root_hash": "DEV" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "connect failed: {body}");
    let project_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

    let mut plan_body = serde_json::json!({});
    if let Some(doc) = tasks_document {
        plan_body["tasks_document"] = doc;
    }
    let (status, body) = post(
        app,
        &format!("/v1/projects/{project_id}/plan"),
        plan_body,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "plan failed: {body}");

    let (status, body) = post(
        app,
        &format!("/v1/projects/{project_id}/plan/approve"),
        serde_json::json!({ "repo_commit": "DEV" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "approve failed: {body}");

    project_id
}
