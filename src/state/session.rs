//! Session store for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! Front ends call the async actions here (`login`, `logout`, ...) and render
//! from [`SessionState`]. The store is the only place that turns
//! [`ApiError`] values into user-facing messages; actions report failure
//! through their return value and [`SessionState::error`], never by
//! propagating the error.
//!
//! DESIGN
//! ======
//! State lives in a `tokio::sync::watch` channel. `snapshot()` reads it,
//! `subscribe()` lets a renderer await changes. Different actions may
//! interleave and race on the shared `loading`/`error`/`user` fields; a
//! second call of the *same* action while the first is in flight is rejected
//! without touching the network.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::net::types::{ImageUpload, Style, StyleCategory, StyleQuery, Task, TaskStatus, TaskSubmission, User};
use crate::net::{ApiError, Backend};
use crate::storage::TokenStore;

pub const LOGIN_FAILED: &str = "Login failed";
pub const REGISTER_FAILED: &str = "Registration failed";
pub const PROFILE_FAILED: &str = "Failed to load user profile";
pub const VIP_FAILED: &str = "VIP subscription failed";
pub const STYLES_FAILED: &str = "Failed to load styles";
pub const TASKS_FAILED: &str = "Failed to load tasks";
pub const CREATE_TASK_FAILED: &str = "Failed to create task";
pub const RETRY_TASK_FAILED: &str = "Failed to retry task";

// =============================================================================
// STATE
// =============================================================================

/// Where the session is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Anonymous,
    /// A token exists (or is being obtained) but no profile has loaded yet.
    Authenticating,
    Authenticated,
}

/// Snapshot of the session as seen by a renderer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    /// Bearer token; empty when signed out.
    pub token: String,
    /// Set only while `token` is non-empty and the last profile fetch succeeded.
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
    /// Confirmation text from the last successful server action.
    pub notice: Option<String>,
    pub status: SessionStatus,
}

impl SessionState {
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        !self.token.is_empty()
    }

    #[must_use]
    pub fn is_vip(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_vip)
    }

    #[must_use]
    pub fn credits(&self) -> u32 {
        self.user.as_ref().map_or(0, |u| u.credits)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Action {
    Login,
    Register,
    FetchProfile,
    SubscribeVip,
}

/// Marks an action as in flight until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<Action>>,
    action: Action,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.action);
    }
}

fn failure_message(err: &ApiError, fallback: &str) -> String {
    err.server_message().map_or_else(|| fallback.to_owned(), str::to_owned)
}

// =============================================================================
// STORE
// =============================================================================

pub struct SessionStore {
    backend: Arc<dyn Backend>,
    tokens: TokenStore,
    state: watch::Sender<SessionState>,
    in_flight: Mutex<HashSet<Action>>,
}

impl SessionStore {
    /// Create a store, restoring the token persisted in `tokens`.
    pub fn new(backend: Arc<dyn Backend>, tokens: TokenStore) -> Self {
        let initial = match tokens.get() {
            Some(token) => {
                tracing::debug!("restored persisted session token");
                SessionState { token, status: SessionStatus::Authenticating, ..SessionState::default() }
            }
            None => SessionState::default(),
        };
        let (state, _) = watch::channel(initial);
        Self { backend, tokens, state, in_flight: Mutex::new(HashSet::new()) }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn token(&self) -> String {
        self.state.borrow().token.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.state.borrow().is_logged_in()
    }

    #[must_use]
    pub fn is_vip(&self) -> bool {
        self.state.borrow().is_vip()
    }

    #[must_use]
    pub fn credits(&self) -> u32 {
        self.state.borrow().credits()
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|s| s.error.take().is_some());
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// Sign in and load the profile. Returns `true` if the session ends signed in.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        let Some(_flight) = self.begin(Action::Login) else {
            return false;
        };
        let previous = self.status();
        self.start_request(Some(SessionStatus::Authenticating));

        let ok = match self.backend.login(username, password).await {
            Ok(resp) => {
                self.store_token(&resp.access_token);
                tracing::info!(username, new_user = resp.is_new_user, "login succeeded");
                self.load_profile().await;
                self.is_logged_in()
            }
            Err(e) => {
                tracing::warn!(username, status = ?e.status(), error = %e, "login failed");
                self.state.send_modify(|s| {
                    s.error = Some(failure_message(&e, LOGIN_FAILED));
                    s.status = previous;
                });
                false
            }
        };

        self.finish_request();
        ok
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, username: &str, password: &str, email: &str) -> bool {
        let Some(_flight) = self.begin(Action::Register) else {
            return false;
        };
        self.start_request(None);

        let ok = match self.backend.register(username, password, email).await {
            Ok(resp) => {
                tracing::info!(username, user_id = ?resp.user_id, "registration succeeded");
                self.state.send_modify(|s| s.notice = Some(resp.message).filter(|m| !m.is_empty()));
                true
            }
            Err(e) => {
                tracing::warn!(username, error = %e, "registration failed");
                self.record_error(&e, REGISTER_FAILED);
                false
            }
        };

        self.finish_request();
        ok
    }

    /// Reload the profile. No-op without a token; a failure signs the user out.
    pub async fn fetch_user_profile(&self) {
        if !self.is_logged_in() {
            return;
        }
        let Some(_flight) = self.begin(Action::FetchProfile) else {
            return;
        };
        self.start_request(None);
        self.load_profile().await;
        self.finish_request();
    }

    /// Subscribe to VIP and refresh the profile so VIP and credit values update.
    pub async fn subscribe_vip(&self) -> bool {
        let Some(_flight) = self.begin(Action::SubscribeVip) else {
            return false;
        };
        self.start_request(None);

        let ok = match self.backend.subscribe_vip().await {
            Ok(resp) => {
                tracing::info!("vip subscription succeeded");
                self.state.send_modify(|s| s.notice = Some(resp.message).filter(|m| !m.is_empty()));
                self.load_profile().await;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "vip subscription failed");
                self.record_error(&e, VIP_FAILED);
                false
            }
        };

        self.finish_request();
        ok
    }

    /// Forget the user and the token, in memory and in storage. Idempotent.
    pub fn logout(&self) {
        if let Err(e) = self.tokens.clear() {
            tracing::warn!(error = %e, "failed to clear persisted token");
        }
        self.state.send_modify(|s| {
            s.user = None;
            s.token.clear();
            s.status = SessionStatus::Anonymous;
        });
        tracing::debug!("session cleared");
    }

    // -------------------------------------------------------------------------
    // Backend passthroughs for views
    // -------------------------------------------------------------------------

    pub async fn styles(&self, query: StyleQuery) -> Option<Vec<Style>> {
        self.tracked(STYLES_FAILED, self.backend.get_styles(query)).await
    }

    pub async fn style_categories(&self, limit: Option<u32>, offset: Option<u32>) -> Option<Vec<StyleCategory>> {
        self.tracked(STYLES_FAILED, self.backend.get_style_categories(limit, offset)).await
    }

    pub async fn recent_styles(&self) -> Option<Vec<Style>> {
        self.tracked(STYLES_FAILED, self.backend.get_recent_styles()).await
    }

    pub async fn tasks(&self, status: Option<&TaskStatus>) -> Option<Vec<Task>> {
        self.tracked(TASKS_FAILED, self.backend.get_tasks(status)).await
    }

    pub async fn task(&self, task_id: &str) -> Option<Task> {
        self.tracked(TASKS_FAILED, self.backend.get_task(task_id)).await
    }

    /// Submit a generation task, then refresh the profile so the spent credit shows.
    pub async fn create_task(
        &self,
        style_id: &str,
        custom_prompt: Option<&str>,
        file: ImageUpload,
    ) -> Option<TaskSubmission> {
        let submission =
            self.tracked(CREATE_TASK_FAILED, self.backend.create_task(style_id, custom_prompt, file)).await?;
        self.load_profile().await;
        Some(submission)
    }

    pub async fn retry_task(&self, task_id: &str) -> Option<TaskSubmission> {
        let submission = self.tracked(RETRY_TASK_FAILED, self.backend.retry_task(task_id)).await?;
        self.load_profile().await;
        Some(submission)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn begin(&self, action: Action) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(action) {
            tracing::debug!(?action, "duplicate action rejected while in flight");
            return None;
        }
        Some(InFlight { set: &self.in_flight, action })
    }

    fn start_request(&self, status: Option<SessionStatus>) {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
            s.notice = None;
            if let Some(status) = status {
                s.status = status;
            }
        });
    }

    fn finish_request(&self) {
        self.state.send_modify(|s| s.loading = false);
    }

    fn record_error(&self, err: &ApiError, fallback: &str) {
        let message = failure_message(err, fallback);
        self.state.send_modify(|s| s.error = Some(message));
    }

    fn store_token(&self, token: &str) {
        if let Err(e) = self.tokens.set(token) {
            tracing::warn!(error = %e, "failed to persist session token");
        }
        self.state.send_modify(|s| {
            s.token = token.to_owned();
            s.status = SessionStatus::Authenticating;
        });
    }

    /// Fetch `/users/me` into state without touching `loading`.
    async fn load_profile(&self) {
        if !self.is_logged_in() {
            return;
        }
        match self.backend.get_user_profile().await {
            Ok(user) => {
                tracing::debug!(username = %user.username, vip = user.is_vip, credits = user.credits, "profile loaded");
                self.state.send_modify(|s| {
                    s.user = Some(user);
                    s.status = SessionStatus::Authenticated;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "profile fetch failed; signing out");
                self.record_error(&e, PROFILE_FAILED);
                self.logout();
            }
        }
    }

    async fn tracked<T, F>(&self, fallback: &str, request: F) -> Option<T>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        self.start_request(None);
        let result = request.await;
        let value = match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(status = ?e.status(), error = %e, "{fallback}");
                self.record_error(&e, fallback);
                None
            }
        };
        self.finish_request();
        value
    }
}
