//! Authenticated HTTP client
//!
//! Wraps every call with bearer-token injection, loading-state bookkeeping and
//! a transparent retry after a single-flight session refresh.

use crate::config::ClientConfig;
use crate::credential_store::CredentialStore;
use crate::error::{ClientError, Result};
use crate::loading::LoadingTracker;
use crate::notify::{notify_error, notify_success, Navigator, NoopNavigator, Notifier, TracingNotifier};
use crate::refresh::RefreshCoordinator;
use crate::types::{ApiResponse, RequestOptions};
use reqwest::multipart::Form;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Collaborators shared by the client and the rest of the application
#[derive(Clone)]
pub struct ClientParts {
    pub credentials: CredentialStore,
    pub loading: LoadingTracker,
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
}

impl Default for ClientParts {
    fn default() -> Self {
        Self {
            credentials: CredentialStore::in_memory(),
            loading: LoadingTracker::new(),
            notifier: Arc::new(TracingNotifier),
            navigator: Arc::new(NoopNavigator),
        }
    }
}

/// HTTP client for the job board API
///
/// Constructed once per process and shared as `Arc<ApiClient>`.
pub struct ApiClient {
    config: ClientConfig,
    http_client: Client,
    credentials: CredentialStore,
    loading: LoadingTracker,
    notifier: Arc<dyn Notifier>,
    refresher: RefreshCoordinator,
    sweeper: JoinHandle<()>,
}

/// Request body, rebuilt for every attempt
enum Payload<'a> {
    Empty,
    Json(Value),
    Form(&'a (dyn Fn() -> Form + Send + Sync)),
}

impl Payload<'_> {
    fn json<B: Serialize + ?Sized>(body: &B) -> Result<Self> {
        Ok(match serde_json::to_value(body)? {
            Value::Null => Payload::Empty,
            value => Payload::Json(value),
        })
    }
}

impl ApiClient {
    /// Create a client with in-memory credentials, a tracing notifier and no
    /// navigation.
    ///
    /// Must be called within a Tokio runtime: the stale-request sweeper is
    /// started on creation.
    pub fn new(config: ClientConfig) -> Result<Arc<Self>> {
        Self::with_parts(config, ClientParts::default())
    }

    pub fn with_parts(config: ClientConfig, parts: ClientParts) -> Result<Arc<Self>> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let refresher = RefreshCoordinator::new(
            http_client.clone(),
            config.url(&config.refresh_path),
            parts.credentials.clone(),
            parts.loading.clone(),
            Arc::clone(&parts.notifier),
            parts.navigator,
        );

        let sweeper = parts
            .loading
            .spawn_sweeper(config.sweep_interval, config.stale_request_after);

        Ok(Arc::new(Self {
            config,
            http_client,
            credentials: parts.credentials,
            loading: parts.loading,
            notifier: parts.notifier,
            refresher,
            sweeper,
        }))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.execute(Method::GET, url, Payload::Empty, options).await
    }

    /// POST a JSON body. Pass `&()` to send no body.
    pub async fn post<B, T>(&self, url: &str, body: &B, options: RequestOptions) -> Result<ApiResponse<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Method::POST, url, Payload::json(body)?, options).await
    }

    pub async fn put<B, T>(&self, url: &str, body: &B, options: RequestOptions) -> Result<ApiResponse<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Method::PUT, url, Payload::json(body)?, options).await
    }

    pub async fn patch<B, T>(&self, url: &str, body: &B, options: RequestOptions) -> Result<ApiResponse<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Method::PATCH, url, Payload::json(body)?, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.execute(Method::DELETE, url, Payload::Empty, options).await
    }

    /// POST a multipart form.
    ///
    /// `build` is called once per attempt, since a form cannot be resent
    /// after a session refresh.
    pub async fn post_form<T, F>(&self, url: &str, build: F, options: RequestOptions) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        F: Fn() -> Form + Send + Sync,
    {
        self.execute(Method::POST, url, Payload::Form(&build), options).await
    }

    /// Refresh the session now, sharing any refresh already in flight
    pub async fn refresh_now(&self) -> Result<String> {
        self.refresher.refresh().await
    }

    /// Show an error toast for a failed call
    pub fn show_error(&self, error: &ClientError, title: Option<&str>) {
        notify_error(self.notifier.as_ref(), &error.to_api_error(), title);
    }

    pub fn show_success(&self, message: &str, title: Option<&str>) {
        notify_success(self.notifier.as_ref(), message, title);
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn loading(&self) -> &LoadingTracker {
        &self.loading
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// The underlying HTTP client, sharing this client's cookie store
    pub(crate) fn http(&self) -> &Client {
        &self.http_client
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        payload: Payload<'_>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        let url = self.config.url(url);
        let mut token = self.credentials.token();
        let mut retried = false;

        loop {
            match self
                .dispatch(&method, &url, &payload, token.as_deref(), &options)
                .await
            {
                Err(err) if !retried && self.triggers_refresh(&err) => {
                    debug!(method = %method, url = %url, status = err.status(), "Request rejected, renewing session");
                    retried = true;
                    token = Some(self.renewed_token(token.as_deref()).await?);
                }
                Err(err) => {
                    if retried && err.is_auth_rejection() {
                        warn!(method = %method, url = %url, status = err.status(), "Request rejected again after session refresh");
                    }
                    return Err(err);
                }
                ok => return ok,
            }
        }
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        method: &Method,
        url: &str,
        payload: &Payload<'_>,
        token: Option<&str>,
        options: &RequestOptions,
    ) -> Result<ApiResponse<T>> {
        // Ended on every exit path when dropped
        let _loading = (!options.skip_global_loading)
            .then(|| self.loading.track(url, method.as_str()));

        let mut request = self
            .http_client
            .request(method.clone(), url)
            .headers(options.headers.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request = match payload {
            Payload::Empty => request,
            Payload::Json(body) => request.json(body),
            Payload::Form(build) => request.multipart(build()),
        };

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(ClientError::from_response(status.as_u16(), error_body(&bytes)));
        }

        let data = if bytes.iter().all(u8::is_ascii_whitespace) {
            serde_json::from_value(Value::Null)?
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(ApiResponse {
            data,
            status: status.as_u16(),
        })
    }

    fn triggers_refresh(&self, err: &ClientError) -> bool {
        match err {
            ClientError::Unauthorized { status: 401, .. } => true,
            ClientError::Unauthorized { status: 403, .. } => self.config.refresh_on_forbidden,
            _ => false,
        }
    }

    /// Token to retry with after an auth rejection of a request sent with `sent`
    async fn renewed_token(&self, sent: Option<&str>) -> Result<String> {
        match self.credentials.token() {
            Some(current) if sent != Some(current.as_str()) => {
                debug!("Token was replaced while the request was in flight, retrying with it");
                Ok(current)
            }
            // The session this request belonged to already ended
            None if sent.is_some() => Err(ClientError::RefreshFailed(self.refresher.last_failure())),
            _ => self.refresher.refresh().await,
        }
    }
}

impl Drop for ApiClient {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

fn error_body(bytes: &[u8]) -> Option<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    serde_json::from_slice(bytes)
        .ok()
        .or_else(|| Some(Value::String(String::from_utf8_lossy(bytes).into_owned())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshState;
    use crate::test_support::{spawn_harness, StubBackend, INITIAL_TOKEN, REFRESHED_TOKEN};
    use reqwest::multipart::Part;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::types::{NotificationLevel, Role};
    use crate::guards::Route;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bearer_header_attached_when_token_present() {
        let h = spawn_harness(StubBackend::accepting(INITIAL_TOKEN)).await;
        h.login(INITIAL_TOKEN, Role::Student);

        let resp: ApiResponse<Value> = h.client.get("/jobs", RequestOptions::new()).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.data["jobs"], json!([]));
        assert_eq!(
            h.backend.seen_authorization(),
            vec![Some(format!("Bearer {INITIAL_TOKEN}"))]
        );
        assert_eq!(h.client.loading().request_count(), 0);
    }

    #[tokio::test]
    async fn test_no_header_without_token() {
        let h = spawn_harness(StubBackend::accepting(INITIAL_TOKEN)).await;

        let _ = h.client.get::<Value>("/public/jobs", RequestOptions::new()).await.unwrap();
        assert_eq!(h.backend.seen_authorization(), vec![None]);
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let h = spawn_harness(
            StubBackend::accepting(REFRESHED_TOKEN).with_refresh_delay(Duration::from_millis(100)),
        )
        .await;
        h.login(INITIAL_TOKEN, Role::Student);

        let (a, b, c) = tokio::join!(
            h.client.get::<Value>("/jobs", RequestOptions::new()),
            h.client.get::<Value>("/jobs", RequestOptions::new()),
            h.client.get::<Value>("/jobs", RequestOptions::new()),
        );
        for result in [a, b, c] {
            assert_eq!(result.unwrap().status, 200);
        }

        assert_eq!(h.backend.refresh_calls(), 1);
        assert_eq!(h.client.refresher().refresh_count(), 1);
        assert_eq!(h.client.refresher().state(), RefreshState::Idle);
        assert_eq!(h.client.refresher().waiting(), 0);

        let retried: Vec<_> = h
            .backend
            .seen_authorization()
            .into_iter()
            .filter(|auth| auth.as_deref() == Some("Bearer T2"))
            .collect();
        assert_eq!(retried.len(), 3);
        assert!(h.backend.refresh_saw_no_authorization());

        assert_eq!(h.client.credentials().token().as_deref(), Some(REFRESHED_TOKEN));
        assert_eq!(h.client.loading().request_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_rejects_everyone_and_clears_session() {
        let h = spawn_harness(
            StubBackend::accepting(REFRESHED_TOKEN)
                .failing_refresh()
                .with_refresh_delay(Duration::from_millis(100)),
        )
        .await;
        h.login(INITIAL_TOKEN, Role::Company);
        // Left open by a request that never reported completion
        h.client.loading().start_request("/long-poll", "GET");

        let (a, b, c) = tokio::join!(
            h.client.get::<Value>("/jobs", RequestOptions::new()),
            h.client.get::<Value>("/jobs", RequestOptions::new()),
            h.client.get::<Value>("/jobs", RequestOptions::new()),
        );
        for result in [a, b, c] {
            match result.unwrap_err() {
                ClientError::RefreshFailed(failure) => {
                    assert_eq!(failure.status, 401);
                    assert_eq!(failure.message, "Authentication failed");
                }
                other => panic!("expected refresh failure, got {other:?}"),
            }
        }

        assert_eq!(h.backend.refresh_calls(), 1);
        assert_eq!(h.client.credentials().credential(), Default::default());
        assert!(h.client.loading().active_requests().is_empty());

        let notes = h.notifier.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Session Expired");
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(h.navigator.routes(), vec![Route::Home]);
    }

    #[tokio::test]
    async fn test_late_rejection_after_failed_refresh_does_not_refresh_again() {
        let h = spawn_harness(StubBackend::accepting(REFRESHED_TOKEN).failing_refresh()).await;
        h.login(INITIAL_TOKEN, Role::Student);

        // The slow route answers 401 after the refresh triggered by the
        // fast one has already failed
        let (fast, slow) = tokio::join!(
            h.client.get::<Value>("/jobs", RequestOptions::new()),
            h.client.get::<Value>("/slow-jobs", RequestOptions::new()),
        );
        for result in [fast, slow] {
            assert!(matches!(result, Err(ClientError::RefreshFailed(_))));
        }

        assert_eq!(h.backend.refresh_calls(), 1);
        assert_eq!(h.notifier.notifications().len(), 1);
        assert_eq!(h.navigator.routes(), vec![Route::Home]);
    }

    #[tokio::test]
    async fn test_retried_request_failing_again_is_terminal() {
        let h = spawn_harness(StubBackend::accepting(REFRESHED_TOKEN)).await;
        h.login(INITIAL_TOKEN, Role::Student);

        let err = h
            .client
            .get::<Value>("/always-unauthorized", RequestOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), 401);
        assert!(err.is_auth_rejection());
        assert_eq!(h.backend.refresh_calls(), 1);
        assert_eq!(h.client.credentials().token().as_deref(), Some(REFRESHED_TOKEN));
    }

    #[tokio::test]
    async fn test_forbidden_does_not_refresh_by_default() {
        let h = spawn_harness(StubBackend::accepting(INITIAL_TOKEN)).await;
        h.login(INITIAL_TOKEN, Role::Viewer);

        let err = h
            .client
            .get::<Value>("/forbidden", RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);
        assert_eq!(err.message(), "Forbidden");
        assert_eq!(h.backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_forbidden_refreshes_when_enabled() {
        let h = crate::test_support::spawn_harness_with(StubBackend::accepting(REFRESHED_TOKEN), |config| {
            config.with_refresh_on_forbidden(true)
        })
        .await;
        h.login(INITIAL_TOKEN, Role::Viewer);

        let err = h
            .client
            .get::<Value>("/forbidden", RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);
        assert_eq!(h.backend.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_server_error_surfaces_message() {
        let h = spawn_harness(StubBackend::accepting(INITIAL_TOKEN)).await;

        let err = h
            .client
            .get::<Value>("/broken", RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 500);
        assert_eq!(err.message(), "boom");
        assert_eq!(err.data(), Some(&json!({ "error": "boom" })));
        assert_eq!(h.backend.refresh_calls(), 0);
        assert_eq!(h.client.loading().request_count(), 0);
    }

    #[tokio::test]
    async fn test_network_failure_has_status_zero() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(ClientConfig::new(format!("http://{addr}/api"))).unwrap();
        let err = client
            .get::<Value>("/jobs", RequestOptions::new())
            .await
            .unwrap_err();

        assert!(err.is_network());
        assert_eq!(err.status(), 0);
        assert_eq!(err.message(), crate::error::NETWORK_ERROR_MESSAGE);
        assert_eq!(client.loading().request_count(), 0);
    }

    #[tokio::test]
    async fn test_post_body_and_empty_delete() {
        let h = spawn_harness(StubBackend::accepting(INITIAL_TOKEN)).await;
        h.login(INITIAL_TOKEN, Role::Student);

        let created: ApiResponse<Value> = h
            .client
            .post("/applications", &json!({ "jobId": 12 }), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(created.status, 201);
        assert_eq!(created.data["jobId"], 12);

        let deleted: ApiResponse<()> = h
            .client
            .delete("/applications/12", RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(deleted.status, 204);
    }

    #[tokio::test]
    async fn test_form_is_rebuilt_for_retry() {
        let h = spawn_harness(StubBackend::accepting(REFRESHED_TOKEN)).await;
        h.login(INITIAL_TOKEN, Role::Student);
        let builds = AtomicUsize::new(0);

        let resp: ApiResponse<Value> = h
            .client
            .post_form(
                "/uploads",
                || {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Form::new()
                        .text("kind", "resume")
                        .part("file", Part::bytes(vec![7u8; 64]).file_name("cv.pdf"))
                },
                RequestOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status, 201);
        assert_eq!(
            resp.data["fields"],
            json!([
                { "name": "kind", "fileName": null, "size": 6 },
                { "name": "file", "fileName": "cv.pdf", "size": 64 },
            ])
        );
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(h.backend.refresh_calls(), 1);
        assert_eq!(
            h.backend.seen_authorization(),
            vec![Some("Bearer T1".to_string()), Some("Bearer T2".to_string())]
        );
        assert_eq!(h.client.loading().request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_only_while_client_lives() {
        let loading = LoadingTracker::new();
        let parts = ClientParts {
            loading: loading.clone(),
            ..ClientParts::default()
        };

        let client = ApiClient::with_parts(ClientConfig::default(), parts.clone()).unwrap();
        loading.start_request("/stuck", "GET");
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(loading.request_count(), 0);

        drop(client);
        loading.start_request("/stuck", "GET");
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(loading.request_count(), 1);
    }

    #[tokio::test]
    async fn test_show_error_uses_api_message() {
        let h = spawn_harness(StubBackend::accepting(INITIAL_TOKEN)).await;
        let err = h
            .client
            .get::<Value>("/broken", RequestOptions::new().skip_global_loading())
            .await
            .unwrap_err();

        h.client.show_error(&err, Some("Could not load jobs"));
        let notes = h.notifier.notifications();
        assert_eq!(notes[0].title, "Could not load jobs");
        assert_eq!(notes[0].description, "boom");
    }

    #[test]
    fn test_error_body_parsing() {
        assert_eq!(error_body(b""), None);
        assert_eq!(error_body(br#"{"error":"x"}"#), Some(json!({ "error": "x" })));
        assert_eq!(error_body(b"Bad Gateway"), Some(json!("Bad Gateway")));
    }
}
