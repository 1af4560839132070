//! Job Board Rust Client
//!
//! A Rust client library for the job board REST API, with bearer-token
//! authentication, single-flight token refresh on authorization failures,
//! global loading tracking and role-based route guards.

pub mod config;
pub mod credential_store;
pub mod error;
pub mod format;
pub mod guards;
pub mod http;
pub mod loading;
pub mod models;
pub mod notify;
pub mod refresh;
pub mod session;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::ClientConfig;
pub use credential_store::{CredentialStorage, CredentialStore, FileStorage, MemoryStorage};
pub use error::{ApiError, ClientError, RefreshFailure, Result};
pub use guards::{check_route, entry_route, Capability, Guard, GuardOutcome, Route};
pub use http::{ApiClient, ClientParts};
pub use loading::{LoadingGuard, LoadingState, LoadingTracker, ProgressIndicator, RequestId};
pub use notify::{
    Navigator, NoopNavigator, Notifier, RecordingNavigator, RecordingNotifier, TracingNotifier,
};
pub use refresh::{RefreshCoordinator, RefreshState};
pub use session::Session;
pub use types::{
    ApiResponse, AuthData, Credential, Notification, NotificationLevel, RequestOptions, Role,
};
