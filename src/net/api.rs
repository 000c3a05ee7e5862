//! REST API adapter for the Pictora backend.
//!
//! DESIGN
//! ======
//! [`Backend`] lists one async operation per backend capability. The session
//! store is generic over it, so tests drive the store with a scripted fake
//! while the binary uses [`ApiClient`], a thin `reqwest` wrapper.
//!
//! Every request re-reads the token from [`TokenStore`] at call time and
//! attaches `Authorization: Bearer <token>` when one is present. The adapter
//! never writes the token.
//!
//! ERROR HANDLING
//! ==============
//! Failures come back as raw [`ApiError`] values. Turning them into
//! user-facing messages is the session store's job.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;

use super::error::{ApiError, request_error};
use super::types::{
    ImageUpload, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, Style, StyleCategory, StyleQuery,
    Task, TaskStatus, TaskSubmission, User, VipSubscription,
};
use crate::config::ClientConfig;
use crate::storage::TokenStore;

// =============================================================================
// BACKEND TRAIT
// =============================================================================

/// Backend capabilities consumed by the client.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// `POST /users/login`.
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError>;

    /// `POST /users/register`.
    async fn register(&self, username: &str, password: &str, email: &str) -> Result<RegisterResponse, ApiError>;

    /// `GET /users/me`.
    async fn get_user_profile(&self) -> Result<User, ApiError>;

    /// `GET /styles` with the set fields of `query` as parameters.
    async fn get_styles(&self, query: StyleQuery) -> Result<Vec<Style>, ApiError>;

    /// `GET /styles/categories`.
    async fn get_style_categories(&self, limit: Option<u32>, offset: Option<u32>)
    -> Result<Vec<StyleCategory>, ApiError>;

    /// `GET /styles/recent`.
    async fn get_recent_styles(&self) -> Result<Vec<Style>, ApiError>;

    /// `POST /tasks` as multipart. `custom_prompt` is sent only when non-empty.
    async fn create_task(
        &self,
        style_id: &str,
        custom_prompt: Option<&str>,
        file: ImageUpload,
    ) -> Result<TaskSubmission, ApiError>;

    /// `GET /tasks`, filtered by `status` when given.
    async fn get_tasks(&self, status: Option<&TaskStatus>) -> Result<Vec<Task>, ApiError>;

    /// `GET /tasks/{id}`.
    async fn get_task(&self, task_id: &str) -> Result<Task, ApiError>;

    /// `POST /tasks/{id}/retry`.
    async fn retry_task(&self, task_id: &str) -> Result<TaskSubmission, ApiError>;

    /// `POST /vip/subscribe`.
    async fn subscribe_vip(&self) -> Result<VipSubscription, ApiError>;
}

// =============================================================================
// PURE HELPERS
// =============================================================================

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn task_path(task_id: &str) -> String {
    format!("/tasks/{task_id}")
}

fn task_retry_path(task_id: &str) -> String {
    format!("/tasks/{task_id}/retry")
}

/// Text fields of the `POST /tasks` multipart body, in send order.
fn task_form_fields(style_id: &str, custom_prompt: Option<&str>) -> Vec<(&'static str, String)> {
    let mut fields = vec![("style_id", style_id.to_owned())];
    if let Some(prompt) = custom_prompt.filter(|p| !p.is_empty()) {
        fields.push(("custom_prompt", prompt.to_owned()));
    }
    fields
}

fn tasks_query(status: Option<&TaskStatus>) -> Vec<(&'static str, String)> {
    status.map(|s| vec![("status", s.as_str().to_owned())]).unwrap_or_default()
}

fn categories_query(limit: Option<u32>, offset: Option<u32>) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(limit) = limit {
        params.push(("limit", limit.to_string()));
    }
    if let Some(offset) = offset {
        params.push(("offset", offset.to_string()));
    }
    params
}

// =============================================================================
// CLIENT
// =============================================================================

/// `reqwest`-backed [`Backend`].
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
}

impl ApiClient {
    /// Build a client for `config.api_url` reading the bearer token from `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, tokens: TokenStore) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.api_url.clone(), tokens })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method.clone(), endpoint(&self.base_url, path));
        match self.tokens.get() {
            Some(token) => {
                tracing::debug!(%method, path, auth = true, "api request");
                builder.bearer_auth(token)
            }
            None => {
                tracing::debug!(%method, path, auth = false, "api request");
                builder
            }
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, path: &str) -> Result<T, ApiError> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!(path, error = %e, "api request failed before a response");
            ApiError::from(e)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            let err = request_error(status.as_u16(), &text);
            tracing::warn!(path, status = status.as_u16(), error = %err, "api request rejected");
            return Err(err);
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(self.request(Method::GET, path), path).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(self.request(Method::POST, path), path).await
    }
}

#[async_trait::async_trait]
impl Backend for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let path = "/users/login";
        let body = LoginRequest { username, password };
        self.send(self.request(Method::POST, path).json(&body), path).await
    }

    async fn register(&self, username: &str, password: &str, email: &str) -> Result<RegisterResponse, ApiError> {
        let path = "/users/register";
        let body = RegisterRequest { username, password, email };
        self.send(self.request(Method::POST, path).json(&body), path).await
    }

    async fn get_user_profile(&self) -> Result<User, ApiError> {
        self.get("/users/me").await
    }

    async fn get_styles(&self, query: StyleQuery) -> Result<Vec<Style>, ApiError> {
        let path = "/styles";
        let mut builder = self.request(Method::GET, path);
        if query != StyleQuery::default() {
            builder = builder.query(&query);
        }
        self.send(builder, path).await
    }

    async fn get_style_categories(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<StyleCategory>, ApiError> {
        let path = "/styles/categories";
        let params = categories_query(limit, offset);
        let mut builder = self.request(Method::GET, path);
        if !params.is_empty() {
            builder = builder.query(&params);
        }
        self.send(builder, path).await
    }

    async fn get_recent_styles(&self) -> Result<Vec<Style>, ApiError> {
        self.get("/styles/recent").await
    }

    async fn create_task(
        &self,
        style_id: &str,
        custom_prompt: Option<&str>,
        file: ImageUpload,
    ) -> Result<TaskSubmission, ApiError> {
        let path = "/tasks";
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.content_type)
            .map_err(|e| ApiError::InvalidUpload(e.to_string()))?;
        let form = task_form_fields(style_id, custom_prompt)
            .into_iter()
            .fold(Form::new().part("file", part), |form, (name, value)| form.text(name, value));
        self.send(self.request(Method::POST, path).multipart(form), path).await
    }

    async fn get_tasks(&self, status: Option<&TaskStatus>) -> Result<Vec<Task>, ApiError> {
        let path = "/tasks";
        let params = tasks_query(status);
        let mut builder = self.request(Method::GET, path);
        if !params.is_empty() {
            builder = builder.query(&params);
        }
        self.send(builder, path).await
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, ApiError> {
        self.get(&task_path(task_id)).await
    }

    async fn retry_task(&self, task_id: &str) -> Result<TaskSubmission, ApiError> {
        self.post_empty(&task_retry_path(task_id)).await
    }

    async fn subscribe_vip(&self) -> Result<VipSubscription, ApiError> {
        self.post_empty("/vip/subscribe").await
    }
}
