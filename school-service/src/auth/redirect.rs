//! Post-login redirect allow-list.

use std::net::{Ipv4Addr, Ipv6Addr};

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use url::{Host, Url};

use crate::config::SecurityConfig;

const FALLBACK: &str = "/";

#[derive(Debug, Clone, Default)]
pub struct RedirectPolicy {
    allowed_origins: Vec<String>,
    deployment_hosts: Vec<String>,
}

impl RedirectPolicy {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            allowed_origins: config
                .allowed_origins
                .iter()
                .filter(|o| o.as_str() != "*")
                .map(|o| o.trim_end_matches('/').to_lowercase())
                .collect(),
            deployment_hosts: config
                .deployment_hosts
                .iter()
                .map(|h| h.to_lowercase())
                .collect(),
        }
    }

    /// Returns `raw` when it is an acceptable redirect target, `/` otherwise.
    pub fn safe_redirect(&self, raw: Option<&str>) -> String {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return FALLBACK.to_string();
        };

        if raw.starts_with('/') {
            return if is_same_site_path(raw) {
                raw.to_string()
            } else {
                FALLBACK.to_string()
            };
        }

        match Url::parse(raw) {
            Ok(url) if self.allows(&url) => url.to_string(),
            _ => FALLBACK.to_string(),
        }
    }

    fn allows(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        let loopback = match url.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
            Some(Host::Ipv6(ip)) => ip == Ipv6Addr::LOCALHOST,
            None => return false,
        };
        if loopback {
            return true;
        }

        if let Some(Host::Domain(domain)) = url.host() {
            let domain = domain.to_lowercase();
            if self.deployment_hosts.iter().any(|h| *h == domain) {
                return true;
            }
        }

        let origin = url.origin().ascii_serialization();
        self.allowed_origins.iter().any(|o| *o == origin)
    }
}

/// `302 Found` to `target`. A target that cannot travel in a header becomes `/`.
#[derive(Debug, Clone)]
pub struct Found(HeaderValue);

impl Found {
    pub fn to(target: &str) -> Self {
        Self(HeaderValue::from_str(target).unwrap_or_else(|_| HeaderValue::from_static(FALLBACK)))
    }
}

impl IntoResponse for Found {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(header::LOCATION, self.0)]).into_response()
    }
}

/// A single leading slash only. `//host` and `/\host` are protocol-relative in browsers.
fn is_same_site_path(raw: &str) -> bool {
    !raw.starts_with("//")
        && !raw.starts_with("/\\")
        && !raw.chars().any(|c| c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RedirectPolicy {
        RedirectPolicy::new(&SecurityConfig {
            allowed_origins: vec!["https://app.school.example/".to_string()],
            deployment_hosts: vec!["School-API.example".to_string()],
        })
    }

    #[test]
    fn test_relative_paths() {
        let p = policy();
        assert_eq!(p.safe_redirect(Some("/dashboard?tab=1")), "/dashboard?tab=1");
        assert_eq!(p.safe_redirect(Some("//evil.example/x")), "/");
        assert_eq!(p.safe_redirect(Some("/\\evil.example")), "/");
        assert_eq!(p.safe_redirect(None), "/");
        assert_eq!(p.safe_redirect(Some("   ")), "/");
    }

    #[test]
    fn test_loopback_hosts() {
        let p = policy();
        assert_eq!(
            p.safe_redirect(Some("http://localhost:5173/home")),
            "http://localhost:5173/home"
        );
        assert_eq!(
            p.safe_redirect(Some("http://127.0.0.1:3000/")),
            "http://127.0.0.1:3000/"
        );
        assert_eq!(p.safe_redirect(Some("http://[::1]:8080/")), "http://[::1]:8080/");
    }

    #[test]
    fn test_lookalike_hosts_fall_back() {
        let p = policy();
        assert_eq!(p.safe_redirect(Some("http://localhost.evil.example/")), "/");
        assert_eq!(p.safe_redirect(Some("http://localhost@evil.example/")), "/");
        assert_eq!(p.safe_redirect(Some("https://app.school.example.evil.io/")), "/");
    }

    #[test]
    fn test_configured_origins_and_hosts() {
        let p = policy();
        assert_eq!(
            p.safe_redirect(Some("https://app.school.example/welcome")),
            "https://app.school.example/welcome"
        );
        // Origin match includes the scheme.
        assert_eq!(p.safe_redirect(Some("http://app.school.example/welcome")), "/");
        assert_eq!(
            p.safe_redirect(Some("https://school-api.example/after")),
            "https://school-api.example/after"
        );
    }

    #[test]
    fn test_found_is_a_302_with_location() {
        let response = Found::to("/dashboard").into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");

        let response = Found::to("/caf\u{e9}").into_response();
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    #[test]
    fn test_other_schemes_and_garbage() {
        let p = policy();
        assert_eq!(p.safe_redirect(Some("javascript:alert(1)")), "/");
        assert_eq!(p.safe_redirect(Some("ftp://localhost/")), "/");
        assert_eq!(p.safe_redirect(Some("not a url")), "/");
    }
}
