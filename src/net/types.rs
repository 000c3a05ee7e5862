//! Wire DTOs for the backend REST API.
//!
//! DESIGN
//! ======
//! The backend is loose about optional fields, so most fields carry serde
//! defaults. Unknown fields are ignored everywhere.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// AUTH
// =============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub email: &'a str,
}

/// `POST /users/login` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub is_new_user: bool,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

/// `POST /users/register` response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Profile of the signed-in user from `GET /users/me`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_vip: bool,
    #[serde(default)]
    pub credits: u32,
}

/// `POST /vip/subscribe` response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipSubscription {
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// STYLES
// =============================================================================

/// A style effect the backend can apply to an uploaded photo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub preview_image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_popular: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleCategory {
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
}

/// Filter and paging for `GET /styles`. Unset fields are not sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StyleQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

// =============================================================================
// TASKS
// =============================================================================

/// Lifecycle of a generation task.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// A status this client does not know yet.
    Other(String),
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => Self::Other(other.to_owned()),
        })
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|never| match never {}))
    }
}

/// A generation task as listed by `GET /tasks` and `GET /tasks/{id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub style_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub input_image: Option<String>,
    #[serde(default)]
    pub output_image: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Result of `POST /tasks` and `POST /tasks/{id}/retry`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub message: String,
}

/// Binary image content for `POST /tasks`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: file_name.into(), content_type: content_type.into(), bytes }
    }

    /// Guess the MIME type from a file extension, `application/octet-stream` if unknown.
    #[must_use]
    pub fn content_type_for(file_name: &str) -> &'static str {
        let ext = file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            Some("bmp") => "image/bmp",
            _ => "application/octet-stream",
        }
    }
}

/// Accept ids sent either as strings or as bare numbers.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
