//! Type definitions shared across the client

use crate::error::ClientError;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User role as issued by the backend
///
/// Matches are exhaustive throughout the crate, so adding a role forces every
/// guard and redirect table to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Student,
    Company,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Student => "student",
            Role::Company => "company",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "student" => Ok(Role::Student),
            "company" => Ok(Role::Company),
            "admin" => Ok(Role::Admin),
            other => Err(ClientError::InvalidResponse(format!("unknown role: {other}"))),
        }
    }
}

/// Session credentials held by the [`CredentialStore`](crate::CredentialStore)
///
/// The default value is the logged-out state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub token: Option<String>,
    pub username: Option<String>,
    pub role: Option<Role>,
    pub user_id: Option<String>,
    pub is_registered: bool,
}

impl Credential {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Login / profile payload used to install a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub token: String,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_registered: Option<bool>,
}

/// Body of a successful `POST /auth/refresh`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Body of `GET /me`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_registered: Option<bool>,
}

/// Successful response of an API call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Do not register the request with the loading tracker
    pub skip_global_loading: bool,
    /// Extra headers sent with every attempt of the request
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_global_loading(mut self) -> Self {
        self.skip_global_loading = true;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// User-facing message handed to a [`Notifier`](crate::Notifier)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub level: NotificationLevel,
}
