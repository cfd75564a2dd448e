use axum::http::{HeaderValue, Response, StatusCode, header};
use axum::response::IntoResponse;
use checkin_core::inbound::replies;
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
};

type RateLimitLayer =
    GovernorLayer<SmartIpKeyExtractor, governor::middleware::NoOpMiddleware, axum::body::Body>;

type ErrorHandler = fn(GovernorError) -> Response<axum::body::Body>;

fn layer(replenish_ms: u64, burst: u32, name: &str, on_error: ErrorHandler) -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_millisecond(replenish_ms)
            .burst_size(burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap_or_else(|| panic!("invalid governor config for {name}")),
    )
    .error_handler(on_error)
}

/// Rate limit for GET /checkin/reply: 30 requests per minute per IP.
pub fn reply_layer() -> RateLimitLayer {
    layer(2_000, 10, "reply", json_error_handler)
}

/// Rate limit for POST /checkin/note: 10 requests per minute per IP.
pub fn note_layer() -> RateLimitLayer {
    layer(6_000, 5, "note", json_error_handler)
}

/// Rate limit for POST /v1/webhooks/sms: 120 requests per minute per IP.
/// The carrier sends from a small pool of addresses, so the allowance is wide.
/// Throttled callbacks still get 200 TwiML so the carrier does not retry.
pub fn webhook_layer() -> RateLimitLayer {
    layer(500, 60, "webhook", twiml_error_handler)
}

/// Rate limit for the bearer-authenticated operator endpoints: 60 requests per minute per IP.
pub fn operator_layer() -> RateLimitLayer {
    layer(1_000, 20, "operator", json_error_handler)
}

/// Returns JSON in ApiError format with a Retry-After header.
fn json_error_handler(err: GovernorError) -> Response<axum::body::Body> {
    let (status, retry_after, message) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(wait_time),
            format!("Too many requests. Retry after {wait_time} seconds."),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Unable to determine client identity for rate limiting".to_string(),
        ),
        GovernorError::Other { code, msg, .. } => (code, None, msg.unwrap_or_default()),
    };

    let body = serde_json::json!({
        "error": checkin_core::error::codes::RATE_LIMITED,
        "message": message,
        "request_id": uuid::Uuid::now_v7().to_string(),
    });

    let mut response = (status, axum::Json(body)).into_response();
    if let Some(wait) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(wait));
    }
    response
}

/// Carrier-facing variant: the reply is always a well-formed 200 TwiML message.
fn twiml_error_handler(err: GovernorError) -> Response<axum::body::Body> {
    tracing::warn!(error = %err, "inbound sms throttled");
    crate::inbound::twiml_response(replies::TEMPORARY_ISSUE)
}
