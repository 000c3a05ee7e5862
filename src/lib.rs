//! # pictora
//!
//! Client core for the Pictora photo-styling app.
//!
//! SYSTEM CONTEXT
//! ==============
//! `net` talks to the backend REST API, `state` holds the user session,
//! `router` owns the route table and the navigation guard, and `storage`
//! persists the bearer token shared by all three. The `pictora` binary is a
//! terminal front end over the same pieces.

pub mod config;
pub mod net;
pub mod router;
pub mod state;
pub mod storage;

/// Display name used for page titles.
pub const APP_NAME: &str = "Pictora";
