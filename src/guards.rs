//! Role-based route guards
//!
//! Each [`Route`] names the [`Guard`] protecting it, and each guard decides
//! from the current [`Credential`] whether to allow, redirect or deny.
//! Role handling is written as exhaustive matches so that introducing a new
//! [`Role`] does not compile until every guard has an answer for it.

use crate::credential_store::CredentialStore;
use crate::types::{Credential, Role};
use std::fmt;

/// Something a role is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    BrowseJobs,
    ApplyToJobs,
    RegisterAsStudent,
    ManageJobPostings,
    Administer,
}

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Viewer => &[Capability::BrowseJobs, Capability::RegisterAsStudent],
            Role::Student => &[Capability::BrowseJobs, Capability::ApplyToJobs],
            Role::Company => &[Capability::BrowseJobs, Capability::ManageJobPostings],
            Role::Admin => &[Capability::BrowseJobs, Capability::Administer],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Where a freshly authenticated user of this role lands
    pub fn landing(&self) -> Route {
        match self {
            Role::Viewer | Role::Student => Route::Jobs,
            Role::Company => Route::Dashboard,
            Role::Admin => Route::AdminLogin,
        }
    }
}

/// Application routes known to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Unauthenticated entry point
    Home,
    /// Admin login page
    AdminLogin,
    AdminDashboard,
    Dashboard,
    Jobs,
    StudentApplications,
    StudentRegister,
    /// Viewer onboarding page
    Welcome,
}

impl Route {
    pub const ALL: [Route; 8] = [
        Route::Home,
        Route::AdminLogin,
        Route::AdminDashboard,
        Route::Dashboard,
        Route::Jobs,
        Route::StudentApplications,
        Route::StudentRegister,
        Route::Welcome,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::AdminLogin => "/admin",
            Route::AdminDashboard => "/admin/dashboard",
            Route::Dashboard => "/dashboard",
            Route::Jobs => "/jobs",
            Route::StudentApplications => "/student/applications",
            Route::StudentRegister => "/student/register",
            Route::Welcome => "/welcome",
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        let trimmed = match path.trim_end_matches('/') {
            "" => "/",
            other => other,
        };
        Route::ALL.into_iter().find(|route| route.path() == trimmed)
    }

    pub fn guard(&self) -> Guard {
        match self {
            Route::Home | Route::AdminLogin => Guard::Public,
            Route::AdminDashboard => Guard::Admin,
            Route::Dashboard | Route::Jobs => Guard::Authenticated,
            Route::StudentApplications => Guard::Student,
            Route::StudentRegister => Guard::StudentRegister,
            Route::Welcome => Guard::Viewer,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Access policy attached to a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Public,
    Authenticated,
    Admin,
    Student,
    StudentRegister,
    Viewer,
}

/// Result of running a guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    /// Navigate elsewhere, replacing the current history entry
    Redirect(Route),
    /// Render an error page
    Deny { status: u16, message: &'static str },
}

impl GuardOutcome {
    fn forbidden(message: &'static str) -> Self {
        GuardOutcome::Deny {
            status: 403,
            message,
        }
    }
}

impl Guard {
    pub fn check(&self, credential: &Credential) -> GuardOutcome {
        if *self == Guard::Public {
            return GuardOutcome::Allow;
        }
        if !credential.is_authenticated() {
            return GuardOutcome::Redirect(Route::Home);
        }

        match self {
            Guard::Public | Guard::Authenticated => GuardOutcome::Allow,
            Guard::Admin => admin_guard(credential.role),
            Guard::Student => student_guard(credential.role),
            Guard::StudentRegister => student_register_guard(credential.role, credential.is_registered),
            Guard::Viewer => viewer_guard(credential.role),
        }
    }
}

fn admin_guard(role: Option<Role>) -> GuardOutcome {
    match role {
        Some(role) if role.can(Capability::Administer) => GuardOutcome::Allow,
        _ => GuardOutcome::forbidden("Admin access required"),
    }
}

fn student_guard(role: Option<Role>) -> GuardOutcome {
    let Some(role) = role else {
        return GuardOutcome::Redirect(Route::Home);
    };
    if role.can(Capability::ApplyToJobs) {
        return GuardOutcome::Allow;
    }
    GuardOutcome::Redirect(match role {
        Role::Company => Route::Dashboard,
        Role::Admin => Route::AdminDashboard,
        Role::Viewer | Role::Student => Route::Jobs,
    })
}

fn student_register_guard(role: Option<Role>, is_registered: bool) -> GuardOutcome {
    match role {
        Some(role) if role.can(Capability::RegisterAsStudent) => {
            if is_registered {
                GuardOutcome::forbidden("Already registered")
            } else {
                GuardOutcome::Allow
            }
        }
        _ => GuardOutcome::Redirect(Route::Dashboard),
    }
}

// Admins are refused outright rather than sent to their dashboard
fn viewer_guard(role: Option<Role>) -> GuardOutcome {
    match role {
        Some(Role::Viewer) => GuardOutcome::Allow,
        Some(Role::Company | Role::Student) => GuardOutcome::Redirect(Route::Dashboard),
        Some(Role::Admin) | None => GuardOutcome::forbidden("Access denied"),
    }
}

/// Unauthenticated entry point for a user whose session just ended
pub fn entry_route(role: Option<Role>) -> Route {
    match role {
        Some(Role::Admin) => Route::AdminLogin,
        Some(Role::Viewer | Role::Student | Role::Company) | None => Route::Home,
    }
}

/// Run the guard of `route` against the current session
pub fn check_route(route: Route, store: &CredentialStore) -> GuardOutcome {
    route.guard().check(&store.credential())
}
