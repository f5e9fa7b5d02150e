//! Shared helpers: an in-process fake of the Couchbase management API and
//! a fake container handle pointing at it.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use couchbox_container::{ContainerError, ContainerHandle};
use couchbox_core::{CouchbaseContainer, ProvisioningConfig, ReadinessPolicy};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Provisioning call the fake can be told to reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Settings,
    Bucket,
    Scope,
    Collection,
}

#[derive(Debug, Clone)]
pub struct Rejection {
    pub step: Step,
    pub status: u16,
    pub body: String,
}

/// A request as seen by the fake server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: &'static str,
    pub path: String,
    pub has_auth: bool,
    pub form: HashMap<String, String>,
}

type Collections = BTreeMap<String, (String, String)>;

#[derive(Default)]
pub struct FakeState {
    requests: Mutex<Vec<Recorded>>,
    unready_checks: AtomicU32,
    never_ready: AtomicBool,
    rejection: Mutex<Option<Rejection>>,
    credentials: Mutex<Option<(String, String)>>,
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Collections>>>,
    docs: Mutex<HashMap<String, Value>>,
}

impl FakeState {
    /// Answer the first `n` readiness checks with 503.
    pub fn unready_for(&self, n: u32) {
        self.unready_checks.store(n, Ordering::SeqCst);
    }

    /// Answer every readiness check with 503.
    pub fn never_ready(&self) {
        self.never_ready.store(true, Ordering::SeqCst);
    }

    /// Reject one provisioning call.
    pub fn reject(&self, step: Step, status: u16, body: &str) {
        *self.rejection.lock().unwrap() = Some(Rejection {
            step,
            status,
            body: body.to_string(),
        });
    }

    /// Pretend bootstrap already created this hierarchy.
    pub fn seed(&self, user: &str, pass: &str, bucket: &str, scope: &str, collection: &str) {
        *self.credentials.lock().unwrap() = Some((user.to_string(), pass.to_string()));
        let mut collections = BTreeMap::new();
        collections.insert(collection.to_string(), ("0".to_string(), "false".to_string()));
        let mut scopes = BTreeMap::new();
        scopes.insert(scope.to_string(), collections);
        self.buckets.lock().unwrap().insert(bucket.to_string(), scopes);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Paths of every POST, in arrival order.
    pub fn posts(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "POST")
            .map(|r| r.path)
            .collect()
    }

    pub fn readiness_checks(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == "GET" && r.path == "/settings/web")
            .count()
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.buckets.lock().unwrap().keys().cloned().collect()
    }

    fn record(&self, method: &'static str, path: String, headers: &HeaderMap, form: HashMap<String, String>) {
        self.requests.lock().unwrap().push(Recorded {
            method,
            path,
            has_auth: headers.contains_key(AUTHORIZATION),
            form,
        });
    }

    fn rejection_for(&self, step: Step) -> Option<Response> {
        let rejection = self.rejection.lock().unwrap().clone()?;
        (rejection.step == step).then(|| {
            let status = StatusCode::from_u16(rejection.status).unwrap();
            (status, rejection.body).into_response()
        })
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return false;
        };
        let Some(decoded) = STANDARD
            .decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
        else {
            return false;
        };
        match self.credentials.lock().unwrap().as_ref() {
            Some((user, pass)) => decoded == format!("{user}:{pass}"),
            None => false,
        }
    }
}

type Shared = Arc<FakeState>;

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "").into_response()
}

async fn get_settings(State(state): State<Shared>, headers: HeaderMap) -> Response {
    state.record("GET", "/settings/web".into(), &headers, HashMap::new());
    if state.never_ready.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response();
    }
    let pending = state.unready_checks.load(Ordering::SeqCst);
    if pending > 0 {
        state.unready_checks.store(pending - 1, Ordering::SeqCst);
        return (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response();
    }
    Json(json!({"port": 8091})).into_response()
}

async fn post_settings(
    State(state): State<Shared>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.record("POST", "/settings/web".into(), &headers, form.clone());
    if let Some(rejected) = state.rejection_for(Step::Settings) {
        return rejected;
    }
    let already_set = state.credentials.lock().unwrap().is_some();
    if already_set && !state.authorized(&headers) {
        return unauthorized();
    }
    let (Some(user), Some(pass)) = (form.get("username"), form.get("password")) else {
        return (StatusCode::BAD_REQUEST, r#"{"errors":{"username":"required"}}"#).into_response();
    };
    *state.credentials.lock().unwrap() = Some((user.clone(), pass.clone()));
    Json(json!({"newBaseUri": "http://127.0.0.1:8091/"})).into_response()
}

async fn get_pool(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"name": "default", "nodes": [{"hostname": "127.0.0.1:8091", "status": "healthy"}]}))
        .into_response()
}

async fn list_buckets(State(state): State<Shared>, headers: HeaderMap) -> Response {
    state.record("GET", "/pools/default/buckets".into(), &headers, HashMap::new());
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let buckets: Vec<Value> = state
        .bucket_names()
        .into_iter()
        .map(|name| json!({"name": name, "bucketType": "membase", "quota": {"ram": 268435456}}))
        .collect();
    Json(Value::Array(buckets)).into_response()
}

async fn create_bucket(
    State(state): State<Shared>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.record("POST", "/pools/default/buckets".into(), &headers, form.clone());
    if !state.authorized(&headers) {
        return unauthorized();
    }
    if let Some(rejected) = state.rejection_for(Step::Bucket) {
        return rejected;
    }
    let name = form.get("name").cloned().unwrap_or_default();
    let mut buckets = state.buckets.lock().unwrap();
    if buckets.contains_key(&name) {
        return (
            StatusCode::BAD_REQUEST,
            r#"{"errors":{"name":"Bucket with given name already exists"}}"#,
        )
            .into_response();
    }
    buckets.insert(name, BTreeMap::new());
    StatusCode::ACCEPTED.into_response()
}

async fn list_scopes(
    State(state): State<Shared>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let buckets = state.buckets.lock().unwrap();
    let Some(scopes) = buckets.get(&bucket) else {
        return (StatusCode::NOT_FOUND, "Requested resource not found.").into_response();
    };
    let mut listed = vec![json!({
        "name": "_default",
        "uid": "0",
        "collections": [{"name": "_default", "uid": "0"}],
    })];
    for (name, collections) in scopes {
        let collections: Vec<Value> = collections
            .iter()
            .map(|(c, (ttl, history))| {
                json!({
                    "name": c,
                    "uid": "9",
                    "maxTTL": ttl.parse::<u32>().unwrap_or(0),
                    "history": history == "true",
                })
            })
            .collect();
        listed.push(json!({"name": name, "uid": "8", "collections": collections}));
    }
    Json(json!({"uid": "2", "scopes": listed})).into_response()
}

async fn create_scope(
    State(state): State<Shared>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.record(
        "POST",
        format!("/pools/default/buckets/{bucket}/scopes"),
        &headers,
        form.clone(),
    );
    if !state.authorized(&headers) {
        return unauthorized();
    }
    if let Some(rejected) = state.rejection_for(Step::Scope) {
        return rejected;
    }
    let name = form.get("name").cloned().unwrap_or_default();
    let mut buckets = state.buckets.lock().unwrap();
    let Some(scopes) = buckets.get_mut(&bucket) else {
        return (StatusCode::NOT_FOUND, "Requested resource not found.").into_response();
    };
    if scopes.contains_key(&name) {
        return (
            StatusCode::BAD_REQUEST,
            r#"{"errors":{"name":"Scope with this name already exists"}}"#,
        )
            .into_response();
    }
    scopes.insert(name, BTreeMap::new());
    Json(json!({"uid": "8"})).into_response()
}

async fn create_collection(
    State(state): State<Shared>,
    Path((bucket, scope)): Path<(String, String)>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.record(
        "POST",
        format!("/pools/default/buckets/{bucket}/scopes/{scope}/collections"),
        &headers,
        form.clone(),
    );
    if !state.authorized(&headers) {
        return unauthorized();
    }
    if let Some(rejected) = state.rejection_for(Step::Collection) {
        return rejected;
    }
    let mut buckets = state.buckets.lock().unwrap();
    let Some(collections) = buckets.get_mut(&bucket).and_then(|s| s.get_mut(&scope)) else {
        return (StatusCode::NOT_FOUND, "Requested resource not found.").into_response();
    };
    let name = form.get("name").cloned().unwrap_or_default();
    let ttl = form.get("maxTTL").cloned().unwrap_or_default();
    let history = form.get("history").cloned().unwrap_or_default();
    collections.insert(name, (ttl, history));
    Json(json!({"uid": "9"})).into_response()
}

fn doc_key(bucket: &str, scope: &str, collection: &str, key: &str) -> String {
    format!("{bucket}/{scope}/{collection}/{key}")
}

async fn get_doc(
    State(state): State<Shared>,
    Path((bucket, scope, collection, key)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let docs = state.docs.lock().unwrap();
    match docs.get(&doc_key(&bucket, &scope, &collection, &key)) {
        Some(value) => Json(json!({
            "meta": {"id": key, "rev": "1-17d1c2e3", "expiration": 0, "flags": 33554432},
            "json": value,
        }))
        .into_response(),
        None => (StatusCode::NOT_FOUND, r#"{"error":"not_found"}"#).into_response(),
    }
}

async fn upsert_doc(
    State(state): State<Shared>,
    Path((bucket, scope, collection, key)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let Some(value) = form
        .get("value")
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
    else {
        return (StatusCode::BAD_REQUEST, r#"{"error":"invalid json"}"#).into_response();
    };
    state
        .docs
        .lock()
        .unwrap()
        .insert(doc_key(&bucket, &scope, &collection, &key), value);
    StatusCode::OK.into_response()
}

async fn remove_doc(
    State(state): State<Shared>,
    Path((bucket, scope, collection, key)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    match state
        .docs
        .lock()
        .unwrap()
        .remove(&doc_key(&bucket, &scope, &collection, &key))
    {
        Some(_) => StatusCode::OK.into_response(),
        None => (StatusCode::NOT_FOUND, r#"{"error":"not_found"}"#).into_response(),
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/settings/web", get(get_settings).post(post_settings))
        .route("/pools/default", get(get_pool))
        .route(
            "/pools/default/buckets",
            get(list_buckets).post(create_bucket),
        )
        .route(
            "/pools/default/buckets/:bucket/scopes",
            get(list_scopes).post(create_scope),
        )
        .route(
            "/pools/default/buckets/:bucket/scopes/:scope/collections",
            post(create_collection),
        )
        .route(
            "/pools/default/buckets/:bucket/scopes/:scope/collections/:collection/docs/:key",
            get(get_doc).post(upsert_doc).delete(remove_doc),
        )
        .with_state(state)
}

/// Fake management API served on a local port.
pub struct FakeServer {
    pub addr: SocketAddr,
    pub state: Shared,
    task: JoinHandle<()>,
}

impl FakeServer {
    /// Serve on a random local port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, Arc::new(FakeState::default()))
    }

    /// Serve `state` on an already bound listener.
    pub fn serve(listener: TcpListener, state: Shared) -> Self {
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state, task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Reserve a local port with nothing listening on it.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Accept connections on a local port and never answer them.
pub async fn unresponsive_listener() -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (port, task)
}

/// Container handle whose every port maps to one local port.
pub struct FakeContainer {
    port: u16,
    log_marker_seen: bool,
    pub stopped: Arc<AtomicBool>,
    pub requested_ports: Arc<Mutex<Vec<u16>>>,
}

impl FakeContainer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            log_marker_seen: true,
            stopped: Arc::new(AtomicBool::new(false)),
            requested_ports: Arc::default(),
        }
    }

    /// A container whose log never shows the startup marker.
    pub fn silent(port: u16) -> Self {
        Self {
            log_marker_seen: false,
            ..Self::new(port)
        }
    }
}

#[async_trait]
impl ContainerHandle for FakeContainer {
    fn id(&self) -> &str {
        "fake-couchbase"
    }

    async fn host(&self) -> couchbox_container::Result<String> {
        Ok("127.0.0.1".to_string())
    }

    async fn mapped_port(&self, internal_port: u16) -> couchbox_container::Result<u16> {
        self.requested_ports.lock().unwrap().push(internal_port);
        Ok(self.port)
    }

    async fn wait_for_log(&self, marker: &str, timeout: Duration) -> couchbox_container::Result<()> {
        if self.log_marker_seen {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(ContainerError::LogTimeout {
            marker: marker.to_string(),
            timeout,
        })
    }

    async fn stop(&mut self) -> couchbox_container::Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Fast readiness bounds for tests.
pub fn fast_readiness() -> ReadinessPolicy {
    ReadinessPolicy {
        interval: Duration::from_millis(50),
        deadline: Duration::from_secs(5),
        request_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

/// Config with distinct names so paths are easy to assert on.
pub fn test_config() -> ProvisioningConfig {
    ProvisioningConfig::builder()
        .username("administrator")
        .password("password")
        .bucket("travel")
        .scope("inventory")
        .collection("airline")
        .readiness(fast_readiness())
        .build_with_env(|_| None)
        .unwrap()
}

/// Attach a provisioning container to the fake server.
pub async fn attach(server: &FakeServer, config: ProvisioningConfig) -> CouchbaseContainer {
    CouchbaseContainer::attach(config, FakeContainer::new(server.addr.port()))
        .await
        .unwrap()
}
