//! Networking modules for the backend REST API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` performs the HTTP calls, `types` defines the wire schema, and
//! `error` is the failure taxonomy the session store converts into
//! user-facing messages.

pub mod api;
pub mod error;
pub mod types;

pub use api::{ApiClient, Backend};
pub use error::ApiError;
