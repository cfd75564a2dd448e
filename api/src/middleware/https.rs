use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use checkin_core::inbound::replies;

use crate::inbound::twiml_response;
use crate::routes::sms::WEBHOOK_PATH;

/// Enforce HTTPS via the `X-Forwarded-Proto` header set by the TLS-terminating proxy.
///
/// Plain-HTTP `GET`/`HEAD` requests (reply links) are 301-redirected to the
/// HTTPS equivalent. Other methods get a 403 instead, since a redirect would
/// drop the form body and break the carrier's signature. The carrier webhook
/// is refused with its usual 200 TwiML rejection instead. All responses get HSTS.
pub async fn require_https(req: Request, next: Next) -> Response {
    let proto = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");

    if proto == "http" {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            let mut response = if req.uri().path() == WEBHOOK_PATH {
                tracing::warn!("inbound sms over plain http refused");
                twiml_response(replies::REJECTED)
            } else {
                StatusCode::FORBIDDEN.into_response()
            };
            add_hsts_header(&mut response);
            return response;
        }

        let host = req
            .headers()
            .get("x-forwarded-host")
            .or_else(|| req.headers().get("host"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");

        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let https_uri = format!("https://{host}{path_and_query}");

        if let Ok(uri) = https_uri.parse::<Uri>() {
            let mut response = (StatusCode::MOVED_PERMANENTLY, [("location", uri.to_string())])
                .into_response();
            add_hsts_header(&mut response);
            return response;
        }
    }

    let mut response = next.run(req).await;
    add_hsts_header(&mut response);
    response
}

fn add_hsts_header(response: &mut Response) {
    response.headers_mut().insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
}
