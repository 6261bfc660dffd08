//! Credential loading falls back to environment variables.

use rollcall::GlobalConfig;
use serial_test::serial;

const COOKIE_VAR: &str = "ROLLCALL_SESSION_COOKIE";
const CSRF_VAR: &str = "ROLLCALL_CSRF_TOKEN";

fn clear_env() {
    std::env::remove_var(COOKIE_VAR);
    std::env::remove_var(CSRF_VAR);
}

#[tokio::test]
#[serial]
async fn env_credentials_are_loaded() {
    clear_env();
    std::env::set_var(COOKIE_VAR, "session=abc123");
    std::env::set_var(CSRF_VAR, "tok-1");

    let mut config = GlobalConfig::with_base_url("http://localhost:5000").expect("config");
    config.load_credentials().await.expect("load");

    assert_eq!(config.credentials.session_cookie.as_deref(), Some("session=abc123"));
    assert_eq!(config.credentials.csrf_token.as_deref(), Some("tok-1"));
    clear_env();
}

#[tokio::test]
#[serial]
async fn missing_credentials_are_not_an_error() {
    clear_env();

    let mut config = GlobalConfig::with_base_url("http://localhost:5000").expect("config");
    config.load_credentials().await.expect("load");

    assert!(config.credentials.session_cookie.is_none());
    assert!(config.credentials.csrf_token.is_none());
}

#[tokio::test]
#[serial]
async fn empty_env_value_counts_as_missing() {
    clear_env();
    std::env::set_var(CSRF_VAR, "");

    let mut config = GlobalConfig::with_base_url("http://localhost:5000").expect("config");
    config.load_credentials().await.expect("load");

    assert!(config.credentials.csrf_token.is_none());
    clear_env();
}
