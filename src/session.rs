//! Session lifecycle: login, profile bootstrap, logout and proactive refresh

use crate::error::{ClientError, Result};
use crate::guards::{entry_route, Route};
use crate::http::ApiClient;
use crate::notify::Navigator;
use crate::types::{AuthData, MeResponse, RequestOptions};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

/// Read the `exp` claim of a JWT without verifying its signature.
///
/// The client never holds the signing key; the server remains the authority
/// on validity. This is only used to schedule refreshes.
pub fn token_expiry(token: &str) -> Result<i64> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims.exp)
        .map_err(|e| ClientError::InvalidResponse(format!("undecodable access token: {e}")))
}

/// Delay before refreshing a token that expires at `exp` (unix seconds),
/// refreshing `lead` early. Never shorter than one millisecond.
pub fn refresh_delay(exp: i64, now_millis: i64, lead: Duration) -> Duration {
    let lead_millis = i64::try_from(lead.as_millis()).unwrap_or(i64::MAX);
    let remaining = exp
        .saturating_mul(1000)
        .saturating_sub(now_millis)
        .saturating_sub(lead_millis);
    Duration::from_millis(remaining.max(1) as u64)
}

/// Owns the session lifecycle on top of an [`ApiClient`]
pub struct Session {
    client: Arc<ApiClient>,
    navigator: Arc<dyn Navigator>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(client: Arc<ApiClient>, navigator: Arc<dyn Navigator>) -> Arc<Self> {
        Arc::new(Self {
            client,
            navigator,
            scheduler: Mutex::new(None),
        })
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    /// Install credentials returned by a login endpoint and start the
    /// proactive refresh schedule
    pub fn login_with(self: &Arc<Self>, data: AuthData) -> Result<Route> {
        let role = data.role;
        self.client.credentials().set_auth_data(data)?;
        info!(role = %role, "Session started");
        self.schedule_refresh();
        Ok(role.landing())
    }

    /// Validate the restored token against `GET /me` and load the profile.
    ///
    /// Returns the route the user should land on. Any failure ends the
    /// session and returns the entry route.
    pub async fn bootstrap(self: &Arc<Self>) -> Route {
        let Some(token) = self.client.credentials().token() else {
            return Route::Home;
        };
        let role = self.client.credentials().role();

        let me_path = self.client.config().me_path.clone();
        match self.client.get::<MeResponse>(&me_path, RequestOptions::new()).await {
            Ok(response) => {
                let me = response.data;
                // A refresh may have replaced the token during the call
                let token = self.client.credentials().token().unwrap_or(token);
                let installed = self.login_with(AuthData {
                    token,
                    username: me.username,
                    role: me.role,
                    user_id: me.user_id,
                    is_registered: me.is_registered,
                });
                match installed {
                    Ok(route) => route,
                    Err(e) => {
                        warn!(error = %e, "Failed to store profile");
                        self.logout().await
                    }
                }
            }
            // The failed refresh has already ended the session and redirected
            Err(ClientError::RefreshFailed(failure)) => {
                debug!(error = %failure, "Stored session could not be renewed");
                self.cancel_refresh();
                entry_route(role)
            }
            Err(e) => {
                debug!(error = %e, "Stored session is no longer valid");
                self.logout().await
            }
        }
    }

    /// End the session. The server call is best-effort; local state is
    /// cleared regardless. Returns the route navigated to.
    pub async fn logout(&self) -> Route {
        let role = self.client.credentials().role();
        let token = self.client.credentials().token();
        self.cancel_refresh();

        let url = self.client.config().url(&self.client.config().logout_path);
        let mut request = self.client.http().post(&url);
        if let Some(token) = token.as_deref() {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                debug!(status = %response.status(), "Logout endpoint returned an error");
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Logout request failed"),
        }

        if let Err(e) = self.client.credentials().clear() {
            warn!(error = %e, "Failed to clear persisted credentials");
        }

        let route = entry_route(role);
        self.navigator.navigate(route, true);
        info!("Session ended");
        route
    }

    /// (Re)start the task refreshing the token shortly before it expires
    pub fn schedule_refresh(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let task = tokio::spawn(async move {
            session.run_refresh_schedule().await;
        });

        let previous = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn cancel_refresh(&self) {
        if let Some(task) = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    async fn run_refresh_schedule(&self) {
        let lead = self.client.config().refresh_before_expiry;
        loop {
            let Some(token) = self.client.credentials().token() else {
                return;
            };

            let exp = match token_expiry(&token) {
                Ok(exp) => exp,
                Err(e) => {
                    warn!(error = %e, "Cannot schedule token refresh");
                    self.end_from_scheduler().await;
                    return;
                }
            };

            let delay = refresh_delay(exp, chrono::Utc::now().timestamp_millis(), lead);
            debug!(delay_secs = delay.as_secs(), "Scheduled token refresh");
            tokio::time::sleep(delay).await;

            if self.client.credentials().token().as_deref() != Some(token.as_str()) {
                debug!("Token changed while waiting, rescheduling refresh");
                continue;
            }
            if let Err(e) = self.client.refresh_now().await {
                // The refresh path has already torn the session down
                warn!(error = %e, "Scheduled token refresh failed");
                return;
            }
        }
    }

    // Called from inside the scheduler task, so it must not abort itself
    // before the logout finishes.
    async fn end_from_scheduler(&self) {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.logout().await;
    }
}
