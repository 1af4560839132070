//! User-facing side effects: notifications and navigation

use crate::error::ApiError;
use crate::guards::Route;
use crate::types::{Notification, NotificationLevel};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info};

/// Sink for user-facing success and error messages
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

/// Redirects the user interface to a route
pub trait Navigator: Send + Sync + 'static {
    /// `replace` means the current entry should not stay in history
    fn navigate(&self, route: Route, replace: bool);
}

/// Show an error toast for a failed call
pub fn notify_error(notifier: &dyn Notifier, error: &ApiError, title: Option<&str>) {
    notifier.notify(Notification {
        title: title.unwrap_or("Error").to_string(),
        description: error.message.clone(),
        level: NotificationLevel::Error,
    });
}

/// Show a success toast
pub fn notify_success(notifier: &dyn Notifier, message: &str, title: Option<&str>) {
    notifier.notify(Notification {
        title: title.unwrap_or("Success").to_string(),
        description: message.to_string(),
        level: NotificationLevel::Success,
    });
}

/// Notifier that writes to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => {
                info!(title = %notification.title, description = %notification.description, "Notification")
            }
            NotificationLevel::Error => {
                error!(title = %notification.title, description = %notification.description, "Notification")
            }
        }
    }
}

/// Navigator that ignores every request, for headless use
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, route: Route, _replace: bool) {
        info!(route = %route.path(), "Navigation requested (no navigator installed)");
    }
}

/// Notifier that keeps every notification, useful for tests and headless
/// frontends that render toasts later
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

/// Navigator that keeps the requested routes
#[derive(Debug, Default, Clone)]
pub struct RecordingNavigator {
    seen: Arc<Mutex<Vec<Route>>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route, _replace: bool) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route);
    }
}
