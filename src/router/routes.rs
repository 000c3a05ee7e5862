//! Static route table.

#[cfg(test)]
#[path = "routes_test.rs"]
mod routes_test;

pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";

/// Paths reachable without a session.
pub const PUBLIC_PATHS: &[&str] = &[LOGIN_PATH, REGISTER_PATH];

/// Opaque handle for the view a route renders. Views are supplied by the front end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Generate,
    Styles,
    Tasks,
    Profile,
    Login,
    Register,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub path: &'static str,
    pub name: Option<&'static str>,
    pub view: Option<ViewKey>,
    /// Shown in the title bar as `<title> - Pictora`.
    pub title: Option<&'static str>,
    /// Set on pure redirect routes, which have no view.
    pub redirect: Option<&'static str>,
}

const fn page(path: &'static str, name: &'static str, view: ViewKey, title: &'static str) -> RouteDescriptor {
    RouteDescriptor { path, name: Some(name), view: Some(view), title: Some(title), redirect: None }
}

pub const ROUTES: &[RouteDescriptor] = &[
    RouteDescriptor { path: "/", name: None, view: None, title: None, redirect: Some("/generate") },
    page("/generate", "Generate", ViewKey::Generate, "Generate"),
    page("/styles", "Styles", ViewKey::Styles, "Styles"),
    page("/tasks", "Tasks", ViewKey::Tasks, "Tasks"),
    page("/profile", "Profile", ViewKey::Profile, "Profile"),
    page(LOGIN_PATH, "Login", ViewKey::Login, "Login"),
    page(REGISTER_PATH, "Register", ViewKey::Register, "Register"),
];

/// Canonical form of a navigation target: leading `/`, no trailing `/`, no
/// query string or fragment.
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let path = raw.split(['?', '#']).next().unwrap_or_default().trim();
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}

/// Route registered for an already-normalized `path`.
#[must_use]
pub fn find(path: &str) -> Option<&'static RouteDescriptor> {
    ROUTES.iter().find(|r| r.path == path)
}

/// Whether `path` may be visited without a session.
#[must_use]
pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&normalize_path(path).as_str())
}
