//! Reply-link landing page and follow-up note form. These are the only
//! routes a recipient reaches from a message; they render HTML and never
//! reveal why a token was rejected.

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use checkin_core::alerts::{normalize_note, scan_note};
use checkin_core::checkins::{ResponseSource, ResponseWrite};
use checkin_core::token::TokenPurpose;

use crate::alerts::record_note_alert;
use crate::pages;
use crate::state::AppState;

pub fn reply_router() -> Router<AppState> {
    Router::new().route("/checkin/reply", get(reply_landing))
}

pub fn note_router() -> Router<AppState> {
    Router::new().route("/checkin/note", post(submit_note))
}

fn page(status: StatusCode, html: String) -> Response {
    (status, [(header::CACHE_CONTROL, "no-store")], Html(html)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ReplyQuery {
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn reply_landing(State(state): State<AppState>, Query(query): Query<ReplyQuery>) -> Response {
    let verified = query
        .token
        .as_deref()
        .and_then(|token| state.codec.verify_for(token, TokenPurpose::Reply));
    let Some((payload, value)) = verified.and_then(|p| p.value.map(|v| (p, v))) else {
        tracing::info!("reply link rejected");
        return page(StatusCode::BAD_REQUEST, pages::render_link_error());
    };

    let write = ResponseWrite {
        assessment_id: payload.assessment_id,
        day: payload.day,
        value,
        pain_score: None,
        source: ResponseSource::EmailLink,
        note: None,
    };
    if let Err(e) = state.store.upsert_response(write).await {
        tracing::error!(
            assessment_id = %payload.assessment_id,
            day = payload.day,
            error = %e,
            "failed to record reply link response"
        );
        return page(StatusCode::INTERNAL_SERVER_ERROR, pages::render_temporary_error());
    }

    tracing::info!(
        assessment_id = %payload.assessment_id,
        day = payload.day,
        value = %value,
        "email check-in recorded"
    );

    let note_token = state.codec.sign(&payload.note_for());
    page(
        StatusCode::OK,
        pages::render_reply_recorded(payload.day, value, &note_token),
    )
}

#[derive(Debug, Deserialize)]
pub struct NoteForm {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub note: String,
}

pub async fn submit_note(State(state): State<AppState>, Form(form): Form<NoteForm>) -> Response {
    let verified = state.codec.verify_for(&form.token, TokenPurpose::Note);
    let Some((payload, value)) = verified.and_then(|p| p.value.map(|v| (p, v))) else {
        tracing::info!("note token rejected");
        return page(StatusCode::BAD_REQUEST, pages::render_link_error());
    };

    let Some(note) = normalize_note(&form.note) else {
        return page(StatusCode::OK, pages::render_note_thanks());
    };

    let stored = state
        .store
        .upsert_response(ResponseWrite {
            assessment_id: payload.assessment_id,
            day: payload.day,
            value,
            pain_score: None,
            source: ResponseSource::EmailLink,
            note: Some(note.clone()),
        })
        .await;
    if let Err(e) = &stored {
        tracing::error!(
            assessment_id = %payload.assessment_id,
            day = payload.day,
            error = %e,
            "failed to store check-in note"
        );
    }

    // The note is scanned even when a previous note was kept instead.
    if let Err(e) =
        record_note_alert(state.store.as_ref(), payload.assessment_id, payload.day, &note).await
    {
        tracing::error!(
            assessment_id = %payload.assessment_id,
            day = payload.day,
            error = %e,
            "failed to persist red-flag alert"
        );
    }

    if !scan_note(&note).is_empty() {
        return page(StatusCode::OK, pages::render_safety_notice());
    }
    if stored.is_err() {
        return page(StatusCode::INTERNAL_SERVER_ERROR, pages::render_temporary_error());
    }
    page(StatusCode::OK, pages::render_note_thanks())
}
