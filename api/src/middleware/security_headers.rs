use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

/// Security-header baseline for every response.
///
/// Reply links carry signed tokens in the query string, so pages must never
/// leak their URL through `Referer` or end up in a search index.
pub async fn apply(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("frame-ancestors 'none'"),
    );
    headers.insert("x-robots-tag", HeaderValue::from_static("noindex, nofollow"));
    response
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::{Router, middleware};
    use tower::ServiceExt;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    #[tokio::test]
    async fn reply_pages_get_security_headers() {
        let app = Router::new()
            .route("/checkin/reply", get(ok))
            .layer(middleware::from_fn(super::apply));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/checkin/reply?token=abc.def")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        let headers = response.headers();
        assert_eq!(
            headers
                .get("referrer-policy")
                .expect("referrer-policy header should exist"),
            "no-referrer"
        );
        assert_eq!(
            headers
                .get("x-robots-tag")
                .expect("x-robots-tag header should exist"),
            "noindex, nofollow"
        );
        assert_eq!(
            headers
                .get("x-frame-options")
                .expect("x-frame-options header should exist"),
            "DENY"
        );
        assert_eq!(
            headers
                .get("x-content-type-options")
                .expect("x-content-type-options header should exist"),
            "nosniff"
        );
    }
}
