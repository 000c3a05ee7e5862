use super::*;
use crate::router::routes::{ROUTES, find};

const PUBLIC_PATHS_FOR_TEST: [&str; 2] = ["/login", "/register"];

fn guard_with(token: Option<&str>) -> (NavigationGuard, Arc<TitleCell>) {
    let tokens = TokenStore::in_memory();
    if let Some(token) = token {
        tokens.set(token).unwrap();
    }
    let title = Arc::new(TitleCell::default());
    (NavigationGuard::new(tokens, title.clone()), title)
}

// =============================================================================
// page_title
// =============================================================================

#[test]
fn page_title_uses_route_title() {
    assert_eq!(page_title(find("/tasks")), "Tasks - Pictora");
}

#[test]
fn page_title_falls_back_to_app_name() {
    assert_eq!(page_title(None), "Pictora");
    assert_eq!(page_title(find("/")), "Pictora");
}

// =============================================================================
// before_each
// =============================================================================

#[test]
fn protected_paths_redirect_without_token() {
    let (guard, _title) = guard_with(None);
    for route in ROUTES.iter().filter(|r| !PUBLIC_PATHS_FOR_TEST.contains(&r.path)) {
        assert_eq!(
            guard.before_each(route.path, Some(route)),
            GuardDecision::Redirect(LOGIN_PATH),
            "{} should redirect",
            route.path
        );
    }
    assert_eq!(guard.before_each("/unknown", None), GuardDecision::Redirect(LOGIN_PATH));
}

#[test]
fn public_paths_proceed_regardless_of_token() {
    for token in [None, Some("abc")] {
        let (guard, _title) = guard_with(token);
        for path in PUBLIC_PATHS_FOR_TEST {
            assert_eq!(guard.before_each(path, find(path)), GuardDecision::Proceed, "{path} with {token:?}");
        }
    }
}

#[test]
fn protected_paths_proceed_with_token() {
    let (guard, _title) = guard_with(Some("abc"));
    assert_eq!(guard.before_each("/profile", find("/profile")), GuardDecision::Proceed);
}

#[test]
fn title_is_set_even_when_redirecting() {
    let (guard, title) = guard_with(None);
    guard.before_each("/styles", find("/styles"));
    assert_eq!(title.get(), "Styles - Pictora");
}

#[test]
fn guard_rereads_storage_each_time() {
    let tokens = TokenStore::in_memory();
    let guard = NavigationGuard::new(tokens.clone(), Arc::new(TitleCell::default()));

    assert_eq!(guard.before_each("/tasks", find("/tasks")), GuardDecision::Redirect(LOGIN_PATH));
    tokens.set("abc").unwrap();
    assert_eq!(guard.before_each("/tasks", find("/tasks")), GuardDecision::Proceed);
    tokens.clear().unwrap();
    assert_eq!(guard.before_each("/tasks", find("/tasks")), GuardDecision::Redirect(LOGIN_PATH));
}
