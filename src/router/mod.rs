//! Client-side routing: route table, navigation guard, and resolution.
//!
//! SYSTEM CONTEXT
//! ==============
//! Front ends call [`Router::navigate`] and render the view named by the
//! outcome. Static redirects (`/` to `/generate`) are followed first, then
//! the guard runs on the concrete target and may send the user to `/login`.

pub mod guard;
pub mod routes;


use std::sync::Arc;

pub use guard::{GuardDecision, NavigationGuard, PageTitle, TitleCell, page_title};
pub use routes::{LOGIN_PATH, ROUTES, RouteDescriptor, ViewKey};

use crate::storage::TokenStore;

/// Upper bound on redirects followed for one navigation.
const MAX_REDIRECTS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    /// The requested target (after static redirects) is shown.
    Render { route: &'static RouteDescriptor },
    /// The guard refused `from` and sent the user to `route` instead.
    Redirected { from: String, route: &'static RouteDescriptor },
    /// No route matches `path`.
    NotFound { path: String },
}

impl Navigation {
    #[must_use]
    pub fn view(&self) -> Option<ViewKey> {
        match self {
            Self::Render { route } | Self::Redirected { route, .. } => route.view,
            Self::NotFound { .. } => None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Render { route } | Self::Redirected { route, .. } => route.path,
            Self::NotFound { path } => path.as_str(),
        }
    }
}

#[derive(Clone)]
pub struct Router {
    guard: NavigationGuard,
}

impl Router {
    pub fn new(tokens: TokenStore, title: Arc<dyn PageTitle>) -> Self {
        Self { guard: NavigationGuard::new(tokens, title) }
    }

    /// Resolve `target`, running the guard before each concrete transition.
    pub fn navigate(&self, target: &str) -> Navigation {
        let requested = routes::normalize_path(target);
        let mut path = requested.clone();
        let mut refused: Option<String> = None;

        for _ in 0..MAX_REDIRECTS {
            let route = routes::find(&path);
            if let Some(next) = route.and_then(|r| r.redirect) {
                path = next.to_owned();
                continue;
            }

            match self.guard.before_each(&path, route) {
                GuardDecision::Redirect(next) => {
                    refused.get_or_insert_with(|| path.clone());
                    path = next.to_owned();
                }
                GuardDecision::Proceed => {
                    tracing::debug!(requested = %requested, path = %path, "navigation resolved");
                    return match (route, refused) {
                        (Some(route), Some(from)) => Navigation::Redirected { from, route },
                        (Some(route), None) => Navigation::Render { route },
                        (None, _) => Navigation::NotFound { path },
                    };
                }
            }
        }

        tracing::warn!(requested = %requested, "redirect limit reached");
        Navigation::NotFound { path: requested }
    }
}
