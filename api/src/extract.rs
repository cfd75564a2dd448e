//! Custom extractors that convert axum rejections to structured AppError responses.
//!
//! `AppJson<T>` and `AppQuery<T>` replace `axum::Json<T>` and `axum::extract::Query<T>`
//! on the operator endpoints so that bad input produces a JSON `AppError`
//! instead of axum's default plain-text rejection.

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Query, Request,
        rejection::{JsonRejection, QueryRejection},
    },
    http::request::Parts,
};

use crate::error::AppError;

/// JSON extractor that converts deserialization errors to structured `AppError` responses.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

pub struct AppQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(AppQuery(value)),
            Err(rejection) => {
                let body_text = rejection.body_text();
                Err(AppError::Validation {
                    message: format!("Invalid query string: {body_text}"),
                    field: Some(extract_field_from_serde_message(&body_text).unwrap_or("query".to_string())),
                    received: None,
                    docs_hint: Some("See /swagger-ui for the accepted query parameters.".to_string()),
                })
            }
        }
    }
}

/// Convert a `JsonRejection` to a structured `AppError::Validation`.
pub fn map_json_rejection(rejection: JsonRejection) -> AppError {
    let body_text = rejection.body_text();

    let field_hint = extract_field_from_serde_message(&body_text);

    AppError::Validation {
        message: format!("Invalid request body: {body_text}"),
        field: Some(field_hint.unwrap_or("body".to_string())),
        received: None,
        docs_hint: Some(
            "Check the request body against the endpoint's schema at /api-doc/openapi.json."
                .to_string(),
        ),
    }
}

/// Try to extract a field name from serde's error messages.
fn extract_field_from_serde_message(msg: &str) -> Option<String> {
    // Pattern: "missing field `fieldname`"
    if let Some(start) = msg.find("missing field `") {
        let after = &msg[start + 15..];
        if let Some(end) = after.find('`') {
            return Some(after[..end].to_string());
        }
    }
    // Pattern: "unknown field `fieldname`"
    if let Some(start) = msg.find("unknown field `") {
        let after = &msg[start + 15..];
        if let Some(end) = after.find('`') {
            return Some(after[..end].to_string());
        }
    }
    None
}
