use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::state::AppState;

/// Caller presented the operator bearer token (`CHECKIN_DISPATCH_TOKEN`).
#[derive(Debug, Clone, Copy)]
pub struct OperatorAuth;

fn token_matches(presented: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

impl FromRequestParts<AppState> for OperatorAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
                docs_hint: Some(
                    "Include 'Authorization: Bearer <token>' with the dispatch token.".to_string(),
                ),
            })?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authorization header must use Bearer scheme".to_string(),
                docs_hint: Some("Format: 'Authorization: Bearer <token>'".to_string()),
            })?;

        if !token_matches(token.trim(), &state.dispatch_token) {
            tracing::warn!("operator request with invalid token");
            return Err(AppError::Unauthorized {
                message: "Invalid token".to_string(),
                docs_hint: None,
            });
        }

        Ok(OperatorAuth)
    }
}
