use super::*;

// =============================================================================
// normalize_api_url
// =============================================================================

#[test]
fn normalize_api_url_trims_trailing_slashes() {
    assert_eq!(normalize_api_url("http://api.test/"), "http://api.test");
    assert_eq!(normalize_api_url("http://api.test//"), "http://api.test");
}

#[test]
fn normalize_api_url_trims_whitespace() {
    assert_eq!(normalize_api_url("  http://api.test  "), "http://api.test");
}

// =============================================================================
// env_parse_secs (unique var names per test)
// =============================================================================

#[test]
fn env_parse_secs_unset_uses_default() {
    assert_eq!(env_parse_secs("__PICTORA_TEST_SECS_UNSET_4471__", 42).unwrap(), 42);
}

#[test]
fn env_parse_secs_reads_value() {
    let key = "__PICTORA_TEST_SECS_SET_4472__";
    unsafe { std::env::set_var(key, " 15 ") };
    assert_eq!(env_parse_secs(key, 42).unwrap(), 15);
    unsafe { std::env::remove_var(key) };
}

#[test]
fn env_parse_secs_rejects_zero_and_garbage() {
    let key = "__PICTORA_TEST_SECS_BAD_4473__";
    for raw in ["0", "soon", "-3"] {
        unsafe { std::env::set_var(key, raw) };
        let err = env_parse_secs(key, 42).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { value, .. } if value == raw));
    }
    unsafe { std::env::remove_var(key) };
}

// =============================================================================
// from_env: the only test that touches PICTORA_* vars
// =============================================================================

unsafe fn clear_pictora_env() {
    unsafe {
        std::env::remove_var("PICTORA_API_URL");
        std::env::remove_var("PICTORA_TOKEN_FILE");
        std::env::remove_var("PICTORA_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("PICTORA_CONNECT_TIMEOUT_SECS");
    }
}

#[test]
fn from_env_defaults_then_overrides() {
    unsafe { clear_pictora_env() };

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, DEFAULT_API_URL);
    assert_eq!(cfg.timeouts, Timeouts::default());
    assert!(cfg.token_file.ends_with("session.json") || cfg.token_file.ends_with(".pictora-session.json"));

    unsafe {
        std::env::set_var("PICTORA_API_URL", "https://pictora.example/");
        std::env::set_var("PICTORA_TOKEN_FILE", "/tmp/pictora-token.json");
        std::env::set_var("PICTORA_REQUEST_TIMEOUT_SECS", "5");
        std::env::set_var("PICTORA_CONNECT_TIMEOUT_SECS", "2");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, "https://pictora.example");
    assert_eq!(cfg.token_file, PathBuf::from("/tmp/pictora-token.json"));
    assert_eq!(cfg.timeouts, Timeouts { request_secs: 5, connect_secs: 2 });

    unsafe { std::env::set_var("PICTORA_CONNECT_TIMEOUT_SECS", "never") };
    assert!(ClientConfig::from_env().is_err());

    unsafe { clear_pictora_env() };
}

#[test]
fn with_api_url_normalizes() {
    let cfg = ClientConfig::default().with_api_url("http://127.0.0.1:9000/");
    assert_eq!(cfg.api_url, "http://127.0.0.1:9000");
}
