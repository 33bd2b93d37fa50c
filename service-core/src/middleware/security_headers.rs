//! Response hardening applied to every route.

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const ALWAYS: [(HeaderName, &str); 3] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains",
    ),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
];

struct FramePolicy {
    csp: &'static str,
    frame_options: &'static str,
}

/// The docs UI runs inline script and style from its own origin.
const DOCS_POLICY: FramePolicy = FramePolicy {
    csp: "default-src 'self'; script-src 'self' 'unsafe-inline'; \
          style-src 'self' 'unsafe-inline'; img-src 'self' data:",
    frame_options: "SAMEORIGIN",
};

const API_POLICY: FramePolicy = FramePolicy {
    csp: "default-src 'none'; frame-ancestors 'none'",
    frame_options: "DENY",
};

fn is_docs_path(path: &str) -> bool {
    path.starts_with("/docs") || path == "/.well-known/openapi.json"
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let policy = if is_docs_path(req.uri().path()) {
        &DOCS_POLICY
    } else {
        &API_POLICY
    };

    let mut response = next.run(req).await;
    apply(response.headers_mut(), policy);
    response
}

fn apply(headers: &mut HeaderMap, policy: &FramePolicy) {
    for (name, value) in ALWAYS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    // Session-bearing responses must not be cached by intermediaries.
    headers
        .entry(header::CACHE_CONTROL)
        .or_insert(HeaderValue::from_static("no-store"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(policy.csp),
    );
    headers.insert(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static(policy.frame_options),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware::from_fn, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/api/thing", get(|| async { "ok" }))
            .route("/docs/index.html", get(|| async { "docs" }))
            .route(
                "/cached",
                get(|| async { ([(header::CACHE_CONTROL, "max-age=60")], "ok") }),
            )
            .layer(from_fn(security_headers_middleware))
    }

    async fn headers_for(uri: &str) -> HeaderMap {
        app()
            .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .headers()
            .clone()
    }

    #[tokio::test]
    async fn test_api_routes_get_strict_headers() {
        let headers = headers_for("/api/thing").await;
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    }

    #[tokio::test]
    async fn test_docs_may_be_framed_by_same_origin() {
        let headers = headers_for("/docs/index.html").await;
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "SAMEORIGIN");
        assert!(
            headers
                .get(header::CONTENT_SECURITY_POLICY)
                .unwrap()
                .to_str()
                .unwrap()
                .contains("'unsafe-inline'")
        );
    }

    #[tokio::test]
    async fn test_handler_cache_control_is_kept() {
        let headers = headers_for("/cached").await;
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "max-age=60");
    }
}
