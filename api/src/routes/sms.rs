use axum::Router;
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::post;

use crate::inbound::{SIGNATURE_HEADER, reconstruct_request_url, twiml_response};
use crate::state::AppState;

pub const WEBHOOK_PATH: &str = "/v1/webhooks/sms";

pub fn router() -> Router<AppState> {
    Router::new().route(WEBHOOK_PATH, post(inbound_sms))
}

/// Carrier callback for inbound SMS. Always answers 200 with TwiML so the
/// carrier never retries or surfaces an error to the sender.
pub async fn inbound_sms(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Undecodable bytes cannot match the carrier's signature, so the normal
    // rejection path answers them.
    let body = String::from_utf8_lossy(&body);
    let request_url = reconstruct_request_url(&headers, &uri);
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let reply = state
        .inbound
        .handle_inbound(&body, signature, &request_url)
        .await;

    twiml_response(&reply)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use chrono::Utc;
    use tower::ServiceExt;

    use checkin_core::inbound::replies;

    use super::*;
    use crate::inbound::compute_signature;
    use crate::middleware::{https, rate_limit};
    use crate::routes::test_app::{TWILIO_AUTH_TOKEN, app, state};
    use crate::store::CheckInStore;
    use crate::store::memory::MemoryStore;
    use crate::test_support::profile;
    use crate::transport::recording::RecordingTransport;

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        String::from_utf8(bytes.to_vec()).expect("body should be utf-8")
    }

    fn sms_request(from: &str, body: &str, sign: bool) -> Request<Body> {
        let params = vec![
            ("Body".to_string(), body.to_string()),
            ("From".to_string(), from.to_string()),
        ];
        let raw = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        let signature = if sign {
            compute_signature(
                TWILIO_AUTH_TOKEN,
                "https://care.example.com/v1/webhooks/sms",
                &params,
            )
        } else {
            "forged".to_string()
        };

        Request::builder()
            .method("POST")
            .uri("/v1/webhooks/sms")
            .header("host", "internal:3000")
            .header("x-forwarded-proto", "https")
            .header("x-forwarded-host", "care.example.com")
            .header("x-twilio-signature", signature)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(raw))
            .expect("request should build")
    }

    #[tokio::test]
    async fn signed_score_is_recorded() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let p = profile(Utc::now());
        store.add_assessment(p.clone()).await;

        let response = app(&store, &transport)
            .oneshot(sms_request(p.phone.as_deref().unwrap(), "8", true))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/xml")
        );
        let xml = body_text(response).await;
        assert!(xml.contains("<Response><Message>Thanks! We logged your pain as 8/10"));

        let responses = store.responses(p.id).await.unwrap();
        assert_eq!(responses[0].pain_score, Some(8));
    }

    #[tokio::test]
    async fn forged_request_still_gets_200_twiml() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let p = profile(Utc::now());
        store.add_assessment(p.clone()).await;

        let response = app(&store, &transport)
            .oneshot(sms_request(p.phone.as_deref().unwrap(), "8", false))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(replies::REJECTED));
        assert!(store.responses(p.id).await.unwrap().is_empty());
    }

    fn assert_twiml(response: &Response) {
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/xml")
        );
    }

    #[tokio::test]
    async fn non_utf8_body_is_rejected_with_twiml() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let p = profile(Utc::now());
        store.add_assessment(p.clone()).await;

        let mut raw = b"Body=".to_vec();
        raw.extend_from_slice(&[0xff, 0xfe]);
        raw.extend_from_slice(b"&From=%2B15550100");
        let request = Request::builder()
            .method("POST")
            .uri(WEBHOOK_PATH)
            .header("x-forwarded-proto", "https")
            .header("x-forwarded-host", "care.example.com")
            .header("x-twilio-signature", "anything")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(raw))
            .unwrap();

        let response = app(&store, &transport).oneshot(request).await.unwrap();
        assert_twiml(&response);
        assert!(body_text(response).await.contains(replies::REJECTED));
        assert!(store.responses(p.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn throttled_callbacks_still_get_200_twiml() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let p = profile(Utc::now());
        store.add_assessment(p.clone()).await;
        let phone = p.phone.clone().unwrap();

        let limited = router()
            .layer(rate_limit::webhook_layer())
            .with_state(state(&store, &transport));

        let mut throttled = 0;
        for _ in 0..80 {
            let mut request = sms_request(&phone, "5", true);
            request
                .headers_mut()
                .insert("x-forwarded-for", "54.172.60.1".parse().unwrap());
            let response = limited.clone().oneshot(request).await.unwrap();
            assert_twiml(&response);
            if body_text(response).await.contains("temporary issue") {
                throttled += 1;
            }
        }
        assert!(throttled > 0, "burst beyond the limit should be throttled");
    }

    #[tokio::test]
    async fn plain_http_callback_is_refused_with_twiml() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let p = profile(Utc::now());
        store.add_assessment(p.clone()).await;

        let enforced = router()
            .layer(axum::middleware::from_fn(https::require_https))
            .with_state(state(&store, &transport));

        let mut request = sms_request(p.phone.as_deref().unwrap(), "5", true);
        request
            .headers_mut()
            .insert("x-forwarded-proto", "http".parse().unwrap());
        let response = enforced.oneshot(request).await.unwrap();
        assert_twiml(&response);
        assert!(body_text(response).await.contains(replies::REJECTED));
        assert!(store.responses(p.id).await.unwrap().is_empty());
    }
}
