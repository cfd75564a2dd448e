use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use checkin_core::checkins::{Channel, CheckInValue, ResponseSource, ResponseWrite};
use checkin_core::inbound::{
    InboundIntent, acknowledgment, classify, elapsed_day, legacy_value, mask_phone, replies,
    resolve_target_day, response_streak,
};

use crate::store::{CheckInStore, StoreError};

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Twilio request signature: base64(HMAC-SHA1(auth_token, url ++ sorted key ++ value)).
pub fn compute_signature(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut payload = String::from(url);
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }

    let mut mac = match HmacSha1::new_from_slice(auth_token.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

pub fn verify_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let expected = compute_signature(auth_token, url, params);
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(signature.trim().as_bytes()))
}

/// Public URL the carrier signed, rebuilt from proxy headers.
pub fn reconstruct_request_url(headers: &HeaderMap, uri: &Uri) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let proto = header("x-forwarded-proto").unwrap_or("https");
    let host = header("x-forwarded-host")
        .or_else(|| header("host"))
        .unwrap_or("localhost");
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("{proto}://{host}{path}")
}

pub fn parse_form(raw_body: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw_body.as_bytes())
        .into_owned()
        .collect()
}

fn form_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Wrap a reply in a TwiML messaging response.
pub fn twiml(message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        xml_escape(message)
    )
}

/// The only response shape the carrier webhook ever produces: 200 with TwiML.
pub fn twiml_response(message: &str) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        twiml(message),
    )
        .into_response()
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedScore {
    pub day: i32,
    pub value: CheckInValue,
    pub streak: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundReply {
    pub text: String,
    pub recorded: Option<RecordedScore>,
}

impl InboundReply {
    fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            recorded: None,
        }
    }
}

/// Authenticates and applies inbound SMS replies. Every path ends in a reply
/// string safe to hand back to the carrier.
pub struct InboundProcessor {
    store: Arc<dyn CheckInStore>,
    auth_token: Option<String>,
    timeout: Duration,
}

impl InboundProcessor {
    pub fn new(store: Arc<dyn CheckInStore>, auth_token: Option<String>, timeout: Duration) -> Self {
        if auth_token.is_none() {
            tracing::warn!("TWILIO_AUTH_TOKEN not set, inbound SMS will be rejected");
        }
        Self {
            store,
            auth_token,
            timeout,
        }
    }

    pub async fn handle_inbound(
        &self,
        raw_body: &str,
        signature: Option<&str>,
        request_url: &str,
    ) -> String {
        self.handle_inbound_at(raw_body, signature, request_url, Utc::now())
            .await
            .text
    }

    pub async fn handle_inbound_at(
        &self,
        raw_body: &str,
        signature: Option<&str>,
        request_url: &str,
        now: DateTime<Utc>,
    ) -> InboundReply {
        let work = self.process(raw_body, signature, request_url, now);
        match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "inbound sms processing failed");
                InboundReply::plain(replies::TEMPORARY_ISSUE)
            }
            Err(_) => {
                tracing::error!(timeout_ms = self.timeout.as_millis() as u64, "inbound sms timed out");
                InboundReply::plain(replies::TEMPORARY_ISSUE)
            }
        }
    }

    async fn process(
        &self,
        raw_body: &str,
        signature: Option<&str>,
        request_url: &str,
        now: DateTime<Utc>,
    ) -> Result<InboundReply, StoreError> {
        let params = parse_form(raw_body);

        let authentic = match (self.auth_token.as_deref(), signature) {
            (Some(token), Some(signature)) => {
                verify_signature(token, request_url, &params, signature)
            }
            _ => false,
        };
        if !authentic {
            tracing::warn!(url = %request_url, "inbound sms signature rejected");
            return Ok(InboundReply::plain(replies::REJECTED));
        }

        let Some(from) = form_value(&params, "From")
            .map(str::trim)
            .filter(|f| !f.is_empty())
        else {
            return Ok(InboundReply::plain(replies::REJECTED));
        };
        let body = form_value(&params, "Body").unwrap_or_default();
        let masked = mask_phone(from);

        let score = match classify(body) {
            InboundIntent::OptOut => {
                self.store.record_sms_opt_out(from).await?;
                tracing::info!(phone = %masked, "sms opt-out recorded");
                return Ok(InboundReply::plain(replies::OPT_OUT_CONFIRMED));
            }
            InboundIntent::Help => return Ok(InboundReply::plain(replies::HELP)),
            InboundIntent::Unrecognized => {
                tracing::debug!(phone = %masked, "unrecognized sms reply");
                return Ok(InboundReply::plain(replies::RETRY));
            }
            InboundIntent::Score(score) => score,
        };

        let Some(profile) = self.store.assessment_for_phone(from).await? else {
            tracing::info!(phone = %masked, "sms reply from unknown sender");
            return Ok(InboundReply::plain(replies::UNKNOWN_SENDER));
        };

        let scheduled = self.store.scheduled_days(profile.id, Channel::Sms).await?;
        let answered: Vec<i32> = self
            .store
            .responses(profile.id)
            .await?
            .iter()
            .map(|r| r.day)
            .collect();
        let day = resolve_target_day(
            &scheduled,
            &answered,
            elapsed_day(profile.created_at, now),
        );
        let value = legacy_value(score, profile.initial_score);

        self.store
            .upsert_response(ResponseWrite {
                assessment_id: profile.id,
                day,
                value,
                pain_score: Some(score),
                source: ResponseSource::SmsReply,
                note: None,
            })
            .await?;

        let scored_days: Vec<i32> = self
            .store
            .responses(profile.id)
            .await?
            .iter()
            .filter(|r| r.source == ResponseSource::SmsReply && r.pain_score.is_some())
            .map(|r| r.day)
            .collect();
        let streak = response_streak(&scheduled, &scored_days);

        tracing::info!(
            assessment_id = %profile.id,
            phone = %masked,
            day,
            value = %value,
            streak,
            "sms check-in recorded"
        );

        Ok(InboundReply {
            text: acknowledgment(score, day, streak),
            recorded: Some(RecordedScore { day, value, streak }),
        })
    }
}
