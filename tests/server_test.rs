// Integration test for the auth gate HTTP routes
// Drives the warp filter with the bundled regulator, users file and session store

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use auth_gate::auth::provider::{hash_password, FileUserProvider, UserProvider, UserRecord};
use auth_gate::auth::user::UserDetails;
use auth_gate::config::TimingConfig;
use auth_gate::constants::{AUTHENTICATION_FAILED_MESSAGE, USER_BANNED_MESSAGE_PREFIX};
use auth_gate::core::regulator::{MemoryRegulator, RegulationPolicy};
use auth_gate::core::server::{routes, SessionCookie};
use auth_gate::core::session::MemorySessionProvider;
use auth_gate::error::Result;
use auth_gate::handlers::first_factor::{FirstFactorGate, GateProviders};
use auth_gate::handlers::response::RedirectResponseEmitter;

fn gate() -> Arc<FirstFactorGate> {
    let mut users = HashMap::new();
    users.insert(
        "john".to_string(),
        UserRecord {
            password: hash_password("password").unwrap(),
            display_name: Some("John Doe".to_string()),
            email: Some("john.doe@example.com".to_string()),
            emails: Vec::new(),
            groups: vec!["admins".to_string()],
        },
    );

    let providers = GateProviders {
        regulator: Arc::new(
            MemoryRegulator::new(
                RegulationPolicy {
                    max_retries: 3,
                    find_time: Duration::from_secs(120),
                    ban_time: Duration::from_secs(300),
                },
                100,
            )
            .unwrap(),
        ),
        users: Arc::new(FileUserProvider::new(users).unwrap()),
        sessions: Arc::new(MemorySessionProvider::new(
            Duration::from_secs(3600),
            Duration::from_secs(86400),
        )),
        responder: Arc::new(RedirectResponseEmitter::new(
            Some("example.com".to_string()),
            Some("https://home.example.com/".to_string()),
        )),
    };

    let timing = TimingConfig {
        enabled: true,
        window_size: 3,
        initial_delay_ms: 10,
        minimum_delay_ms: 5,
        maximum_jitter_ms: 2,
    };
    Arc::new(FirstFactorGate::new(providers, &timing))
}

fn cookie() -> SessionCookie {
    SessionCookie::new("auth_gate_session".to_string(), Some("example.com".to_string()))
}

fn login(password: &str) -> warp::test::RequestBuilder {
    warp::test::request()
        .method("POST")
        .path("/api/firstfactor")
        .header("cookie", "auth_gate_session=initial")
        .json(&json!({"username": "john", "password": password}))
}

#[tokio::test]
async fn test_health() {
    let filter = routes(gate(), cookie());
    let res = warp::test::request().path("/api/health").reply(&filter).await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.body(), "OK");
}

#[tokio::test]
async fn test_successful_login_sets_regenerated_cookie() {
    let filter = routes(gate(), cookie());

    let res = login("password").reply(&filter).await;

    assert_eq!(res.status(), 200);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body, json!({"status": "OK", "data": {"redirect": "https://home.example.com/"}}));

    let set_cookie = res.headers()["set-cookie"].to_str().unwrap();
    assert!(set_cookie.starts_with("auth_gate_session="));
    assert!(!set_cookie.starts_with("auth_gate_session=initial;"));
    assert!(set_cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_lockout_after_repeated_failures() {
    let filter = routes(gate(), cookie());

    for _ in 0..3 {
        let res = login("wrong").reply(&filter).await;
        assert_eq!(res.status(), 401);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, json!({"status": "KO", "message": AUTHENTICATION_FAILED_MESSAGE}));
    }

    // even the right password is refused while banned
    let res = login("password").reply(&filter).await;
    assert_eq!(res.status(), 401);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert!(body["message"].as_str().unwrap().starts_with(USER_BANNED_MESSAGE_PREFIX));
}

#[tokio::test]
async fn test_missing_cookie_gets_fresh_session() {
    let filter = routes(gate(), cookie());

    let res = warp::test::request()
        .method("POST")
        .path("/api/firstfactor")
        .body("not json")
        .reply(&filter)
        .await;

    assert_eq!(res.status(), 401);
    let set_cookie = res.headers()["set-cookie"].to_str().unwrap();
    assert!(set_cookie.starts_with("auth_gate_session="));
}

#[tokio::test]
async fn test_first_factor_requires_post() {
    let filter = routes(gate(), cookie());
    let res = warp::test::request().path("/api/firstfactor").reply(&filter).await;
    assert_eq!(res.status(), 405);
}

struct CrashingUsers;

#[async_trait]
impl UserProvider for CrashingUsers {
    async fn check_user_password(&self, _username: &str, _password: &str) -> Result<bool> {
        panic!("user backend crashed");
    }

    async fn get_details(&self, username: &str) -> Result<UserDetails> {
        Ok(UserDetails::new(username.to_string()))
    }
}

#[tokio::test]
async fn test_backend_panic_looks_like_a_failed_login() {
    let providers = GateProviders {
        regulator: Arc::new(
            MemoryRegulator::new(
                RegulationPolicy {
                    max_retries: 3,
                    find_time: Duration::from_secs(120),
                    ban_time: Duration::from_secs(300),
                },
                100,
            )
            .unwrap(),
        ),
        users: Arc::new(CrashingUsers),
        sessions: Arc::new(MemorySessionProvider::new(
            Duration::from_secs(3600),
            Duration::from_secs(86400),
        )),
        responder: Arc::new(RedirectResponseEmitter::new(Some("example.com".to_string()), None)),
    };
    let timing = TimingConfig {
        enabled: true,
        window_size: 3,
        initial_delay_ms: 300,
        minimum_delay_ms: 300,
        maximum_jitter_ms: 2,
    };
    let filter = routes(Arc::new(FirstFactorGate::new(providers, &timing)), cookie());

    let started = Instant::now();
    let res = login("password").reply(&filter).await;

    assert_eq!(res.status(), 401);
    assert!(started.elapsed() >= Duration::from_millis(300));
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body, json!({"status": "KO", "message": AUTHENTICATION_FAILED_MESSAGE}));
}

