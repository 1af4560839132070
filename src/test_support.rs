//! In-process stub of the job board backend for tests

use crate::config::ClientConfig;
use crate::credential_store::CredentialStore;
use crate::http::{ApiClient, ClientParts};
use crate::loading::LoadingTracker;
use crate::notify::{RecordingNavigator, RecordingNotifier};
use crate::types::{AuthData, Role};
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub(crate) const INITIAL_TOKEN: &str = "T1";
pub(crate) const REFRESHED_TOKEN: &str = "T2";
pub(crate) const REFRESH_COOKIE: &str = "refresh_token=r-1";
const SLOW_ROUTE_DELAY: Duration = Duration::from_millis(300);

pub(crate) struct StubBackend {
    valid_token: Mutex<String>,
    issued_token: String,
    refresh_ok: bool,
    refresh_delay: Duration,
    refresh_calls: AtomicUsize,
    refresh_had_authorization: AtomicBool,
    logout_calls: AtomicUsize,
    seen_authorization: Mutex<Vec<Option<String>>>,
    refresh_cookies: Mutex<Vec<Option<String>>>,
}

impl StubBackend {
    /// Protected routes accept `token`; refresh hands out [`REFRESHED_TOKEN`]
    pub(crate) fn accepting(token: &str) -> Self {
        Self {
            valid_token: Mutex::new(token.to_string()),
            issued_token: REFRESHED_TOKEN.to_string(),
            refresh_ok: true,
            refresh_delay: Duration::ZERO,
            refresh_calls: AtomicUsize::new(0),
            refresh_had_authorization: AtomicBool::new(false),
            logout_calls: AtomicUsize::new(0),
            seen_authorization: Mutex::new(Vec::new()),
            refresh_cookies: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_refresh(mut self) -> Self {
        self.refresh_ok = false;
        self
    }

    /// Token handed out by the refresh endpoint
    pub(crate) fn issuing(mut self, token: &str) -> Self {
        self.issued_token = token.to_string();
        self
    }

    pub(crate) fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_saw_no_authorization(&self) -> bool {
        !self.refresh_had_authorization.load(Ordering::SeqCst)
    }

    pub(crate) fn seen_authorization(&self) -> Vec<Option<String>> {
        self.seen_authorization.lock().unwrap().clone()
    }

    /// `Cookie` header of every refresh call
    pub(crate) fn refresh_cookies(&self) -> Vec<Option<String>> {
        self.refresh_cookies.lock().unwrap().clone()
    }

    fn record(&self, headers: &HeaderMap) -> bool {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        let authorized = auth.as_deref() == Some(expected.as_str());
        self.seen_authorization.lock().unwrap().push(auth);
        authorized
    }
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

async fn refresh(State(backend): State<Arc<StubBackend>>, headers: HeaderMap) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if headers.contains_key(header::AUTHORIZATION) {
        backend.refresh_had_authorization.store(true, Ordering::SeqCst);
    }
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    backend.refresh_cookies.lock().unwrap().push(cookie);
    tokio::time::sleep(backend.refresh_delay).await;

    if !backend.refresh_ok {
        return unauthorized("Authentication failed");
    }
    *backend.valid_token.lock().unwrap() = backend.issued_token.clone();
    Json(json!({ "token": backend.issued_token, "userId": "u-1" })).into_response()
}

async fn jobs(State(backend): State<Arc<StubBackend>>, headers: HeaderMap) -> Response {
    if backend.record(&headers) {
        Json(json!({ "jobs": [] })).into_response()
    } else {
        unauthorized("Token expired")
    }
}

async fn slow_jobs(State(backend): State<Arc<StubBackend>>, headers: HeaderMap) -> Response {
    tokio::time::sleep(SLOW_ROUTE_DELAY).await;
    jobs(State(backend), headers).await
}

async fn login(State(backend): State<Arc<StubBackend>>) -> Response {
    let token = backend.valid_token.lock().unwrap().clone();
    (
        [(header::SET_COOKIE, format!("{REFRESH_COOKIE}; Path=/; HttpOnly"))],
        Json(json!({ "token": token, "username": "jane", "role": "student" })),
    )
        .into_response()
}

/// Echoes the multipart field names with the size of each field
async fn upload(
    State(backend): State<Arc<StubBackend>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let authorized = backend.record(&headers);
    let mut fields = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let size = field.bytes().await.map(|b| b.len()).unwrap_or_default();
        fields.push(json!({ "name": name, "fileName": file_name, "size": size }));
    }
    if !authorized {
        return unauthorized("Token expired");
    }
    (StatusCode::CREATED, Json(json!({ "fields": fields }))).into_response()
}

async fn public_jobs(State(backend): State<Arc<StubBackend>>, headers: HeaderMap) -> Response {
    backend.record(&headers);
    Json(json!({ "jobs": [] })).into_response()
}

async fn always_unauthorized() -> Response {
    unauthorized("Invalid token")
}

async fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "error": "Forbidden" }))).into_response()
}

async fn broken() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" }))).into_response()
}

async fn create_application(
    State(backend): State<Arc<StubBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !backend.record(&headers) {
        return unauthorized("Token expired");
    }
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn delete_application(State(backend): State<Arc<StubBackend>>, headers: HeaderMap) -> Response {
    if !backend.record(&headers) {
        return unauthorized("Token expired");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn me(State(backend): State<Arc<StubBackend>>, headers: HeaderMap) -> Response {
    if !backend.record(&headers) {
        return unauthorized("Token expired");
    }
    Json(json!({
        "username": "jane",
        "role": "student",
        "userId": "u-1",
        "isRegistered": true
    }))
    .into_response()
}

async fn logout(State(backend): State<Arc<StubBackend>>) -> Response {
    backend.logout_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "message": "Logged out" })).into_response()
}

/// Serve `backend` on an ephemeral port, returning the API base URL
pub(crate) async fn spawn_backend(backend: Arc<StubBackend>) -> (String, JoinHandle<()>) {
    let app = Router::new()
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/login", post(login))
        .route("/api/slow-jobs", get(slow_jobs))
        .route("/api/uploads", post(upload))
        .route("/api/me", get(me))
        .route("/api/jobs", get(jobs))
        .route("/api/public/jobs", get(public_jobs))
        .route("/api/always-unauthorized", get(always_unauthorized))
        .route("/api/forbidden", get(forbidden))
        .route("/api/broken", get(broken))
        .route("/api/applications", post(create_application))
        .route("/api/applications/12", delete(delete_application))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::serve(listener, app.into_make_service());
    let handle = tokio::spawn(async move {
        if let Err(err) = server.await {
            eprintln!("stub backend exited with error: {err}");
        }
    });
    (format!("http://{addr}/api"), handle)
}

pub(crate) struct Harness {
    pub client: Arc<ApiClient>,
    pub backend: Arc<StubBackend>,
    pub notifier: RecordingNotifier,
    pub navigator: RecordingNavigator,
    server: JoinHandle<()>,
}

impl Harness {
    pub(crate) fn login(&self, token: &str, role: Role) {
        self.client
            .credentials()
            .set_auth_data(AuthData {
                token: token.to_string(),
                username: "jane".to_string(),
                role,
                user_id: None,
                is_registered: None,
            })
            .unwrap();
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub(crate) async fn spawn_harness(backend: StubBackend) -> Harness {
    spawn_harness_with(backend, |config| config).await
}

pub(crate) async fn spawn_harness_with(
    backend: StubBackend,
    configure: impl FnOnce(ClientConfig) -> ClientConfig,
) -> Harness {
    let backend = Arc::new(backend);
    let (base_url, server) = spawn_backend(Arc::clone(&backend)).await;
    let notifier = RecordingNotifier::new();
    let navigator = RecordingNavigator::new();

    let parts = ClientParts {
        credentials: CredentialStore::in_memory(),
        loading: LoadingTracker::new(),
        notifier: Arc::new(notifier.clone()),
        navigator: Arc::new(navigator.clone()),
    };
    let client = ApiClient::with_parts(configure(ClientConfig::new(base_url)), parts).unwrap();

    Harness {
        client,
        backend,
        notifier,
        navigator,
        server,
    }
}
