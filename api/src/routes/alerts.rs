use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use checkin_core::checkins::Alert;

use crate::auth::OperatorAuth;
use crate::error::AppError;
use crate::extract::AppQuery;
use crate::state::AppState;

const DEFAULT_ALERT_LIMIT: i64 = 50;
const MAX_ALERT_LIMIT: i64 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/alerts", get(list_alerts))
        .route("/v1/alerts/{id}", delete(dismiss_alert))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListAlertsParams {
    /// Maximum alerts to return (default 50, max 500)
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertListResponse {
    pub alerts: Vec<Alert>,
}

/// List red-flag alerts, newest first
#[utoipa::path(
    get,
    path = "/v1/alerts",
    params(ListAlertsParams),
    responses(
        (status = 200, description = "Alerts awaiting review", body = AlertListResponse),
        (status = 401, description = "Missing or invalid token", body = checkin_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn list_alerts(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    AppQuery(params): AppQuery<ListAlertsParams>,
) -> Result<Json<AlertListResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_ALERT_LIMIT)
        .clamp(1, MAX_ALERT_LIMIT);
    let alerts = state.store.list_alerts(limit).await?;
    Ok(Json(AlertListResponse { alerts }))
}

/// Dismiss an alert after review
///
/// Dismissing removes the alert row, which also lifts the red-flag
/// suppression for the assessment once no other alert remains.
#[utoipa::path(
    delete,
    path = "/v1/alerts/{id}",
    params(("id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 204, description = "Alert dismissed"),
        (status = 401, description = "Missing or invalid token", body = checkin_core::error::ApiError),
        (status = 404, description = "Alert not found", body = checkin_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn dismiss_alert(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.store.dismiss_alert(id).await? {
        return Err(AppError::NotFound {
            resource: format!("alert {id}"),
        });
    }
    tracing::info!(alert_id = %id, "alert dismissed");
    Ok(StatusCode::NO_CONTENT)
}
