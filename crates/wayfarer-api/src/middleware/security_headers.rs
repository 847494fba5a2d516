//! Security headers middleware
//!
//! Every response of this API may carry credentials, so besides the usual
//! hardening headers it is marked as not cacheable.
//!
//! Author: hephaex@gmail.com

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

/// Headers applied to all responses
const HEADERS: [(HeaderName, &str); 8] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "0"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains",
    ),
    (header::REFERRER_POLICY, "no-referrer"),
    (header::CACHE_CONTROL, "no-store"),
    (header::PRAGMA, "no-cache"),
    (
        PERMISSIONS_POLICY,
        "geolocation=(), camera=(), microphone=()",
    ),
];

/// Add security headers to the response
///
/// Headers already set by a handler are left alone, which lets the Swagger
/// UI keep its own caching and framing rules.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in HEADERS {
        if !headers.contains_key(&name) {
            headers.insert(name, HeaderValue::from_static(value));
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn app(router: Router) -> Router {
        router.layer(middleware::from_fn(security_headers))
    }

    #[tokio::test]
    async fn test_security_headers_added() {
        let app = app(Router::new().route("/test", get(|| async { "ok" })));

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(headers.get(header::REFERRER_POLICY).unwrap(), "no-referrer");
        assert_eq!(
            headers.get("permissions-policy").unwrap(),
            "geolocation=(), camera=(), microphone=()"
        );
    }

    #[tokio::test]
    async fn test_security_headers_on_error_response() {
        async fn error_handler() -> impl IntoResponse {
            (StatusCode::UNAUTHORIZED, "nope")
        }

        let app = app(Router::new().route("/error", get(error_handler)));

        let request = Request::builder().uri("/error").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::X_CONTENT_TYPE_OPTIONS).is_some());
        assert!(response.headers().get(header::CACHE_CONTROL).is_some());
    }

    #[tokio::test]
    async fn test_handler_headers_not_overwritten() {
        async fn cached() -> impl IntoResponse {
            ([(header::CACHE_CONTROL, "max-age=60")], "static")
        }

        let app = app(Router::new().route("/static", get(cached)));

        let request = Request::builder().uri("/static").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "max-age=60");
    }
}
