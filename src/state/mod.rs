//! Shared client-side state.
//!
//! DESIGN
//! ======
//! Only the session is global today; view-local state stays with the views.

pub mod session;

pub use session::{SessionState, SessionStatus, SessionStore};
