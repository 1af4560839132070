//! Error types for the job board client

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Message used when the server gave no usable error text.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Message shown for failures where no response was received.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error - please check your connection";

/// Outcome of a failed token refresh, shared by every caller waiting on it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("refresh failed with status {status}: {message}")]
pub struct RefreshFailure {
    /// HTTP status of the refresh response, 0 if none was received
    pub status: u16,
    pub message: String,
}

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    /// No response was received (connect error, timeout, broken body)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The server rejected the credentials (401/403)
    #[error("Unauthorized ({status}): {message}")]
    Unauthorized {
        status: u16,
        message: String,
        data: Option<Value>,
    },

    /// Any other non-2xx response
    #[error("Request failed ({status}): {message}")]
    Server {
        status: u16,
        message: String,
        data: Option<Value>,
    },

    /// The session could not be renewed; credentials have been cleared
    #[error("Session expired: {0}")]
    RefreshFailed(RefreshFailure),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Caller-facing shape of an error, suitable for toasts and logs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ClientError {
    /// Build the error for a non-2xx response.
    ///
    /// 401 and 403 become [`ClientError::Unauthorized`]; everything else is a
    /// [`ClientError::Server`]. The message is taken from the body's `error`
    /// field, then `message`, falling back to a generic text.
    pub fn from_response(status: u16, data: Option<Value>) -> Self {
        let message = data
            .as_ref()
            .and_then(server_message)
            .unwrap_or_else(|| format!("Request failed with status code {status}"));

        match status {
            401 | 403 => ClientError::Unauthorized {
                status,
                message,
                data,
            },
            _ => ClientError::Server {
                status,
                message,
                data,
            },
        }
    }

    /// HTTP status of the failure; 0 means no response was received
    pub fn status(&self) -> u16 {
        match self {
            ClientError::Network(_) => 0,
            ClientError::Unauthorized { status, .. } | ClientError::Server { status, .. } => *status,
            ClientError::RefreshFailed(failure) => failure.status,
            ClientError::Serialization(_)
            | ClientError::InvalidResponse(_)
            | ClientError::Configuration(_)
            | ClientError::Storage(_) => 500,
        }
    }

    /// Human readable message for presentation
    pub fn message(&self) -> String {
        match self {
            ClientError::Network(_) => NETWORK_ERROR_MESSAGE.to_string(),
            ClientError::Unauthorized { message, .. } | ClientError::Server { message, .. } => {
                message.clone()
            }
            ClientError::RefreshFailed(failure) => failure.message.clone(),
            ClientError::Serialization(_) | ClientError::InvalidResponse(_) => {
                GENERIC_ERROR_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }

    /// Response body of the failure, if the server returned one
    pub fn data(&self) -> Option<&Value> {
        match self {
            ClientError::Unauthorized { data, .. } | ClientError::Server { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }

    pub fn to_api_error(&self) -> ApiError {
        ApiError {
            status: self.status(),
            message: self.message(),
            data: self.data().cloned(),
        }
    }
}

impl From<RefreshFailure> for ClientError {
    fn from(failure: RefreshFailure) -> Self {
        ClientError::RefreshFailed(failure)
    }
}

/// Extract `error` or `message` from a JSON error body.
fn server_message(body: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .filter_map(|key| body.get(key))
        .filter_map(Value::as_str)
        .find(|text| !text.trim().is_empty())
        .map(str::to_string)
}
