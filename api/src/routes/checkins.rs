use axum::extract::{Path, State};
use axum::routing::{delete, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use checkin_core::checkins::{Channel, DispatchSummary, QueueItem, schedule_for};

use crate::auth::OperatorAuth;
use crate::dispatch::{DEFAULT_BATCH_LIMIT, MAX_BATCH_LIMIT};
use crate::error::AppError;
use crate::extract::{AppJson, AppQuery};
use crate::state::AppState;
use crate::store::ErasureCounts;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/checkins/dispatch", post(dispatch))
        .route("/v1/checkins/enqueue", post(enqueue))
        .route("/v1/checkins/queue/{id}/retry", post(retry_queue_item))
        .route("/v1/assessments/{id}/checkins", delete(erase_assessment_checkins))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DispatchParams {
    /// Maximum due items to handle (default 100, capped at 1000)
    pub limit: Option<i64>,
    /// Resolve and check suppression without claiming or sending
    #[serde(alias = "dryRun")]
    pub dry_run: Option<bool>,
}

/// Send every due check-in
///
/// Selects queued items with `due_at <= now` and transmits each at most once.
/// Safe to call concurrently: items are claimed with a conditional update
/// before anything is sent.
#[utoipa::path(
    post,
    path = "/v1/checkins/dispatch",
    params(DispatchParams),
    responses(
        (status = 200, description = "Dispatch run summary", body = DispatchSummary),
        (status = 400, description = "Invalid parameters", body = checkin_core::error::ApiError),
        (status = 401, description = "Missing or invalid token", body = checkin_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "checkins"
)]
pub async fn dispatch(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    AppQuery(params): AppQuery<DispatchParams>,
) -> Result<Json<DispatchSummary>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_BATCH_LIMIT);
    if limit < 1 {
        return Err(AppError::Validation {
            message: "limit must be at least 1".to_string(),
            field: Some("limit".to_string()),
            received: Some(serde_json::json!(limit)),
            docs_hint: Some(format!("Use 1..={MAX_BATCH_LIMIT}; larger values are capped.")),
        });
    }

    let summary = state
        .dispatch
        .dispatch_due(
            Utc::now(),
            limit.min(MAX_BATCH_LIMIT),
            params.dry_run.unwrap_or(false),
        )
        .await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct EnqueueRequest {
    pub assessment_id: Uuid,
    pub channel: Channel,
    /// Schedule anchor. Defaults to the assessment's creation time.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnqueueResponse {
    pub items: Vec<QueueItem>,
}

/// Schedule the day 3/7/14 check-ins for an assessment
///
/// Re-enqueueing refreshes rows that are still queued and leaves sent or
/// failed rows untouched.
#[utoipa::path(
    post,
    path = "/v1/checkins/enqueue",
    request_body = EnqueueRequest,
    responses(
        (status = 200, description = "Scheduled items", body = EnqueueResponse),
        (status = 400, description = "Invalid request", body = checkin_core::error::ApiError),
        (status = 401, description = "Missing or invalid token", body = checkin_core::error::ApiError),
        (status = 404, description = "Assessment not found", body = checkin_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "checkins"
)]
pub async fn enqueue(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    AppJson(req): AppJson<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, AppError> {
    let profile = state
        .store
        .assessment(req.assessment_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("assessment {}", req.assessment_id),
        })?;

    let has_recipient = match req.channel {
        Channel::Email => profile.email.as_deref().is_some_and(|e| !e.trim().is_empty()),
        Channel::Sms => profile.phone.as_deref().is_some_and(|p| !p.trim().is_empty()),
    };
    if !has_recipient {
        return Err(AppError::validation(
            "channel",
            format!("assessment has no contact for channel '{}'", req.channel),
        ));
    }

    let anchor = req.completed_at.unwrap_or(profile.created_at);
    let mut items = Vec::new();
    for item in schedule_for(profile.id, anchor, req.channel) {
        items.push(state.store.enqueue(&item).await?);
    }

    tracing::info!(
        assessment_id = %profile.id,
        channel = %req.channel,
        count = items.len(),
        "check-ins scheduled"
    );
    Ok(Json(EnqueueResponse { items }))
}

/// Move a failed queue item back to queued, due immediately
#[utoipa::path(
    post,
    path = "/v1/checkins/queue/{id}/retry",
    params(("id" = Uuid, Path, description = "Queue item id")),
    responses(
        (status = 200, description = "Item re-queued", body = QueueItem),
        (status = 401, description = "Missing or invalid token", body = checkin_core::error::ApiError),
        (status = 404, description = "Queue item not found", body = checkin_core::error::ApiError),
        (status = 409, description = "Item is not in failed state", body = checkin_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "checkins"
)]
pub async fn retry_queue_item(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueItem>, AppError> {
    let requeued = state.store.requeue_failed(id, Utc::now()).await?;
    let item = state
        .store
        .queue_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("queue item {id}"),
        })?;

    if !requeued {
        return Err(AppError::Conflict {
            message: format!("queue item {id} is '{}', only failed items can be retried", item.status),
        });
    }

    tracing::info!(queue_item_id = %id, assessment_id = %item.assessment_id, "check-in re-queued");
    Ok(Json(item))
}

/// Erase queue, response, and alert rows for one assessment
#[utoipa::path(
    delete,
    path = "/v1/assessments/{id}/checkins",
    params(("id" = Uuid, Path, description = "Assessment id")),
    responses(
        (status = 200, description = "Rows deleted", body = ErasureCounts),
        (status = 401, description = "Missing or invalid token", body = checkin_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "checkins"
)]
pub async fn erase_assessment_checkins(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ErasureCounts>, AppError> {
    let counts = state.store.erase_assessment(id).await?;
    tracing::info!(
        assessment_id = %id,
        queue_items = counts.queue_items_deleted,
        responses = counts.responses_deleted,
        alerts = counts.alerts_deleted,
        "check-in data erased"
    );
    Ok(Json(counts))
}
