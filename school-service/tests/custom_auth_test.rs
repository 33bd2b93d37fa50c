mod common;

use axum::http::{Method, StatusCode};
use common::{
    body_json, custom_config, session_cookie, TestApp, ADMIN_EMAIL, ADMIN_PASSWORD,
};
use school_service::{
    config::PasswordHashConfig,
    utils::{Password, PasswordHasher},
};
use serde_json::json;

#[tokio::test]
async fn test_configured_admin_can_log_in() {
    let app = TestApp::start(custom_config(&[])).await;

    let response = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("session cookie");

    let user = body_json(response).await;
    assert_eq!(user["email"], ADMIN_EMAIL);
    assert_eq!(user["role"], "owner");
    assert_eq!(user["organizationId"], 1);

    let response = app.get("/api/auth/user", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], ADMIN_EMAIL);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = TestApp::start(custom_config(&[])).await;

    let wrong_password = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": "wrong" }),
        )
        .await;
    let unknown_email = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": "ghost@school.example", "password": "wrong" }),
        )
        .await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong_password).await, body_json(unknown_email).await);
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let app = TestApp::start(custom_config(&[])).await;

    let response = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": ADMIN_EMAIL }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Email and password are required"
    );
}

#[tokio::test]
async fn test_login_replaces_existing_session() {
    let app = TestApp::start(custom_config(&[])).await;
    let first = app.custom_login(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .json(
            Method::POST,
            "/api/auth/login",
            Some(&first),
            json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let second = session_cookie(&response).expect("session cookie");
    assert_ne!(first, second);

    assert_eq!(
        app.get("/api/auth/user", Some(&first)).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.get("/api/auth/user", Some(&second)).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_admin_password_hash_takes_precedence() {
    let hasher = PasswordHasher::new(&PasswordHashConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap();
    let hash = hasher
        .hash(&Password::new("hashed-secret".to_string()))
        .unwrap();

    let app = TestApp::start(custom_config(&[("ADMIN_PASSWORD_HASH", hash.as_str())])).await;

    app.custom_login(ADMIN_EMAIL, "hashed-secret").await;
    let response = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_setup_admin_is_forbidden_by_default() {
    let app = TestApp::start(custom_config(&[])).await;

    let response = app
        .json(
            Method::POST,
            "/api/auth/setup-admin",
            None,
            json!({ "email": "second@school.example", "password": "another-password" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Admin setup is not allowed");
}

#[tokio::test]
async fn test_setup_admin_creates_owner_once() {
    let app = TestApp::start(custom_config(&[("ALLOW_ADMIN_SETUP", "true")])).await;
    let body = json!({
        "email": "Second@School.example",
        "password": "another-password",
        "firstName": "Grace",
        "lastName": "Hopper"
    });

    let response = app
        .json(Method::POST, "/api/auth/setup-admin", None, body.clone())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["message"], "Admin user created successfully");
    assert_eq!(created["user"]["email"], "second@school.example");
    assert_eq!(created["user"]["role"], "owner");

    app.custom_login("second@school.example", "another-password")
        .await;

    let response = app
        .json(Method::POST, "/api/auth/setup-admin", None, body)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_setup_admin_requires_credentials() {
    let app = TestApp::start(custom_config(&[("ALLOW_ADMIN_SETUP", "1")])).await;

    let response = app
        .json(
            Method::POST,
            "/api/auth/setup-admin",
            None,
            json!({ "email": "third@school.example" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dev_routes_are_not_mounted() {
    let app = TestApp::start(custom_config(&[])).await;

    let response = app
        .json(
            Method::POST,
            "/api/dev/login",
            None,
            json!({ "email": "admin@demo.school", "password": "demo123" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Replace the character at `index` with one that differs even after lower-casing.
fn mutate_at(value: &str, index: usize) -> String {
    value
        .chars()
        .enumerate()
        .map(|(i, c)| match (i == index, c) {
            (false, c) => c,
            (true, 'x') => 'y',
            (true, _) => 'x',
        })
        .collect()
}

async fn login_attempt(app: &TestApp, email: &str, password: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": email, "password": password }),
        )
        .await;
    assert!(session_cookie(&response).is_none());
    (response.status(), body_json(response).await)
}

#[tokio::test]
async fn test_any_single_character_change_is_rejected_uniformly() {
    let app = TestApp::start(custom_config(&[])).await;
    let (_, baseline) = login_attempt(&app, ADMIN_EMAIL, "wrong").await;

    for index in 0..ADMIN_EMAIL.chars().count() {
        let email = mutate_at(ADMIN_EMAIL, index);
        let (status, body) = login_attempt(&app, &email, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "email {}", email);
        assert_eq!(body, baseline, "email {}", email);
    }

    for index in 0..ADMIN_PASSWORD.chars().count() {
        let password = mutate_at(ADMIN_PASSWORD, index);
        let (status, body) = login_attempt(&app, ADMIN_EMAIL, &password).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "password position {}", index);
        assert_eq!(body, baseline, "password position {}", index);
    }
}

#[tokio::test]
async fn test_demo_admin_credentials_log_in_as_owner() {
    let app = TestApp::start(custom_config(&[
        ("ADMIN_EMAIL", "admin@demo.school"),
        ("ADMIN_PASSWORD", "Admin123!"),
    ]))
    .await;

    let response = app
        .json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": "admin@demo.school", "password": "Admin123!" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["role"], "owner");

    let (status, _) = login_attempt(&app, "admin@demo.school", "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_email_change_carries_the_login_along() {
    let app = TestApp::start(custom_config(&[])).await;
    let cookie = app.custom_login(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .json(
            Method::PATCH,
            "/api/profile",
            Some(&cookie),
            json!({ "email": "Head@School.example" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "head@school.example");

    let (status, _) = login_attempt(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    app.custom_login("head@school.example", ADMIN_PASSWORD).await;
}
