//! Shared setup for the in-process router tests. Everything runs against the
//! in-memory store; no external services are needed.

#![allow(dead_code)]

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use school_service::{build_router, config::SchoolConfig, services::Stores, AppState};
use serde_json::Value;
use service_core::config::Config;
use tower::util::ServiceExt;

pub const SESSION_SECRET: &str = "test-session-secret-0123456789abcdef";
pub const ADMIN_EMAIL: &str = "admin@school.example";
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";

pub fn config(pairs: &[(&str, &str)]) -> SchoolConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("SESSION_SECRET".to_string(), SESSION_SECRET.to_string()),
        ("LOG_LEVEL".to_string(), "error".to_string()),
        // Cheap Argon2 parameters keep the suite fast.
        ("PASSWORD_HASH_MEMORY_KIB".to_string(), "1024".to_string()),
        ("PASSWORD_HASH_ITERATIONS".to_string(), "1".to_string()),
    ]);
    for (key, value) in pairs {
        vars.insert(key.to_string(), value.to_string());
    }
    SchoolConfig::from_vars(Config::default(), &vars).expect("test config should be valid")
}

pub fn dev_config() -> SchoolConfig {
    config(&[("AUTH_STRATEGY", "dev")])
}

pub fn custom_config(extra: &[(&str, &str)]) -> SchoolConfig {
    let mut pairs = vec![
        ("AUTH_STRATEGY", "custom"),
        ("ADMIN_EMAIL", ADMIN_EMAIL),
        ("ADMIN_PASSWORD", ADMIN_PASSWORD),
    ];
    pairs.extend_from_slice(extra);
    config(&pairs)
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub async fn start(config: SchoolConfig) -> Self {
        let state = AppState::new(config, Stores::memory())
            .await
            .expect("Failed to start app state");
        Self::from_state(state)
    }

    pub fn from_state(state: AppState) -> Self {
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        self.send(request(Method::GET, uri, cookie, None)).await
    }

    pub async fn json(&self, method: Method, uri: &str, cookie: Option<&str>, body: Value) -> Response {
        self.send(request(method, uri, cookie, Some(body))).await
    }

    /// Log in through `POST /api/dev/login` and return the `name=value` cookie pair.
    pub async fn dev_login(&self, email: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/api/dev/login",
                None,
                serde_json::json!({ "email": email, "password": "demo123" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response).expect("dev login sets a session cookie")
    }

    /// Log in through `POST /api/auth/login` and return the `name=value` cookie pair.
    pub async fn custom_login(&self, email: &str, password: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/api/auth/login",
                None,
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response).expect("login sets a session cookie")
    }
}

pub fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// All `Set-Cookie` headers of a response as `name=value` pairs.
pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(|pair| pair.trim().to_string())
        .collect()
}

/// The non-empty `school.sid` pair set by a response, if any.
pub fn session_cookie(response: &Response) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|pair| pair.starts_with("school.sid=") && pair.len() > "school.sid=".len())
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
