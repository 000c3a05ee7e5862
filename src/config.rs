//! Client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const TOKEN_DIR: &str = ".pictora";
const TOKEN_FILE: &str = "session.json";
const FALLBACK_TOKEN_FILE: &str = ".pictora-session.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend origin without a trailing slash.
    pub api_url: String,
    /// Where `FileStorage` keeps the persisted token.
    pub token_file: PathBuf,
    pub timeouts: Timeouts,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { api_url: DEFAULT_API_URL.to_owned(), token_file: default_token_file(), timeouts: Timeouts::default() }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `PICTORA_API_URL`: default `http://localhost:8000`
    /// - `PICTORA_TOKEN_FILE`: default `~/.pictora/session.json`
    /// - `PICTORA_REQUEST_TIMEOUT_SECS`: default 60
    /// - `PICTORA_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a timeout is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("PICTORA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let token_file = std::env::var_os("PICTORA_TOKEN_FILE").map_or_else(default_token_file, PathBuf::from);
        let timeouts = Timeouts {
            request_secs: env_parse_secs("PICTORA_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: env_parse_secs("PICTORA_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };

        Ok(Self { api_url: normalize_api_url(&api_url), token_file, timeouts })
    }

    /// Replace the API origin, normalizing it the same way `from_env` does.
    #[must_use]
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = normalize_api_url(api_url);
        self
    }

    #[must_use]
    pub fn with_token_file(mut self, token_file: PathBuf) -> Self {
        self.token_file = token_file;
        self
    }
}

pub(crate) fn normalize_api_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn env_parse_secs(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue { var, value: raw }),
    }
}

fn default_token_file() -> PathBuf {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    match home {
        Some(home) => PathBuf::from(home).join(TOKEN_DIR).join(TOKEN_FILE),
        None => PathBuf::from(FALLBACK_TOKEN_FILE),
    }
}
