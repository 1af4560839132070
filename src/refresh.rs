//! Single-flight session refresh
//!
//! When several requests are rejected with 401 at the same time, only one
//! refresh call is made. Every caller that asks for a refresh while it is in
//! flight waits on that same call and observes the same outcome.

use crate::credential_store::CredentialStore;
use crate::error::{ClientError, RefreshFailure, Result};
use crate::guards::entry_route;
use crate::loading::LoadingTracker;
use crate::notify::{Navigator, Notifier};
use crate::types::{AuthData, Notification, NotificationLevel, RefreshResponse};
use async_singleflight::Group;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

const REFRESH_KEY: &str = "session-refresh";

/// Whether a refresh call is currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// Coordinates token refreshes so at most one is outstanding at any time
pub struct RefreshCoordinator {
    http_client: Client,
    refresh_url: String,
    credentials: CredentialStore,
    loading: LoadingTracker,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    /// Singleflight group deduplicating concurrent refreshes.
    /// Followers of a failed leader receive no error from the group, so the
    /// failure is also kept in `last_failure`.
    singleflight: Group<String, RefreshFailure>,
    refreshing: AtomicBool,
    waiting: AtomicUsize,
    refresh_calls: AtomicUsize,
    last_failure: Mutex<Option<RefreshFailure>>,
}

impl RefreshCoordinator {
    pub fn new(
        http_client: Client,
        refresh_url: String,
        credentials: CredentialStore,
        loading: LoadingTracker,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            http_client,
            refresh_url,
            credentials,
            loading,
            notifier,
            navigator,
            singleflight: Group::new(),
            refreshing: AtomicBool::new(false),
            waiting: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            last_failure: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RefreshState {
        if self.refreshing.load(Ordering::SeqCst) {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Number of callers currently waiting on the in-flight refresh,
    /// including the one performing it
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Total number of refresh calls issued so far
    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Obtain a fresh access token, joining an in-flight refresh if any.
    ///
    /// On failure the session has already been torn down: credentials are
    /// cleared, the loading tracker is emptied, the user is notified and sent
    /// to the entry route.
    pub async fn refresh(&self) -> Result<String> {
        let (token, failure, _leader) = {
            let _waiter = Waiter::join(&self.waiting);
            self.singleflight
                .work(REFRESH_KEY, self.refresh_once())
                .await
        };

        match (token, failure) {
            (Some(token), _) => Ok(token),
            (None, Some(failure)) => Err(ClientError::RefreshFailed(failure)),
            (None, None) => Err(ClientError::RefreshFailed(self.last_failure())),
        }
    }

    /// Failure of the most recent refresh, shared with callers that did not
    /// perform it themselves
    pub(crate) fn last_failure(&self) -> RefreshFailure {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| RefreshFailure {
                status: 0,
                message: "Unknown error during token refresh".to_string(),
            })
    }

    async fn refresh_once(&self) -> std::result::Result<String, RefreshFailure> {
        let _in_flight = InFlight::raise(&self.refreshing);
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        debug!(url = %self.refresh_url, "Refreshing session token");

        match self.request_new_token().await {
            Ok(response) => {
                let token = response.token.clone();
                self.store_refreshed(response);
                info!("Session token refreshed successfully");
                Ok(token)
            }
            Err(failure) => {
                *self
                    .last_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(failure.clone());
                self.end_session(&failure);
                Err(failure)
            }
        }
    }

    async fn request_new_token(&self) -> std::result::Result<RefreshResponse, RefreshFailure> {
        let _loading = self.loading.track(&self.refresh_url, "POST");

        // No body and no Authorization header; the refresh cookie travels
        // with the client's cookie store.
        let response = self
            .http_client
            .post(&self.refresh_url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| RefreshFailure {
                status: 0,
                message: format!("refresh request failed: {e}"),
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.json::<Value>().await.ok();
            return Err(RefreshFailure {
                status,
                message: ClientError::from_response(status, body).message(),
            });
        }

        let body: RefreshResponse = response.json().await.map_err(|e| RefreshFailure {
            status,
            message: format!("invalid refresh response: {e}"),
        })?;

        if body.token.trim().is_empty() {
            return Err(RefreshFailure {
                status,
                message: "refresh response did not contain a token".to_string(),
            });
        }
        Ok(body)
    }

    fn store_refreshed(&self, response: RefreshResponse) {
        let stored = match (response.username, response.role) {
            (Some(username), Some(role)) => self.credentials.set_auth_data(AuthData {
                token: response.token,
                username,
                role,
                user_id: response.user_id,
                is_registered: None,
            }),
            _ => self.credentials.update_token(response.token),
        };
        if let Err(e) = stored {
            warn!(error = %e, "Failed to persist refreshed token");
        }
    }

    fn end_session(&self, failure: &RefreshFailure) {
        warn!(
            status = failure.status,
            error = %failure.message,
            "Token refresh failed, ending session"
        );

        let role = self.credentials.role();
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to clear persisted credentials");
        }
        self.loading.force_complete();
        self.notifier.notify(Notification {
            title: "Session Expired".to_string(),
            description: "Please log in again".to_string(),
            level: NotificationLevel::Error,
        });
        self.navigator.navigate(entry_route(role), true);
    }
}

/// Holds the in-flight flag up until dropped, even if the refresh is cancelled
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Counts one caller in the refresh queue for as long as it waits
struct Waiter<'a>(&'a AtomicUsize);

impl<'a> Waiter<'a> {
    fn join(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
