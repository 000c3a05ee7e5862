//! Navigation guard run before every route transition.
//!
//! The guard reads the token from storage on each call instead of asking the
//! session store, so it gives the right answer before any store exists.

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;

use std::sync::{Arc, Mutex, PoisonError};

use super::routes::{LOGIN_PATH, RouteDescriptor, is_public};
use crate::APP_NAME;
use crate::storage::TokenStore;

/// Destination for the computed page title (window title, terminal title, ...).
pub trait PageTitle: Send + Sync {
    fn set_title(&self, title: &str);
}

/// Keeps the last title in memory.
#[derive(Debug, Default)]
pub struct TitleCell {
    title: Mutex<String>,
}

impl TitleCell {
    #[must_use]
    pub fn get(&self) -> String {
        self.title.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl PageTitle for TitleCell {
    fn set_title(&self, title: &str) {
        *self.title.lock().unwrap_or_else(PoisonError::into_inner) = title.to_owned();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Redirect(&'static str),
}

/// `"<title> - Pictora"`, or just the app name for untitled or unknown routes.
#[must_use]
pub fn page_title(route: Option<&RouteDescriptor>) -> String {
    match route.and_then(|r| r.title) {
        Some(title) => format!("{title} - {APP_NAME}"),
        None => APP_NAME.to_owned(),
    }
}

#[derive(Clone)]
pub struct NavigationGuard {
    tokens: TokenStore,
    title: Arc<dyn PageTitle>,
}

impl NavigationGuard {
    pub fn new(tokens: TokenStore, title: Arc<dyn PageTitle>) -> Self {
        Self { tokens, title }
    }

    /// Decide whether navigation to `path` (resolved to `route`, if known) may proceed.
    ///
    /// Always updates the page title first, even when redirecting.
    pub fn before_each(&self, path: &str, route: Option<&RouteDescriptor>) -> GuardDecision {
        self.title.set_title(&page_title(route));

        if !is_public(path) && self.tokens.get().is_none() {
            tracing::debug!(path, "protected route without session; redirecting to login");
            return GuardDecision::Redirect(LOGIN_PATH);
        }
        GuardDecision::Proceed
    }
}
