use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use checkin_core::checkins::Channel;

use crate::util::{api_request, exit_error, require_token};

#[derive(Subcommand)]
pub enum CheckinCommands {
    /// Send every check-in that is due now
    Dispatch {
        /// Maximum items to handle in this run (server caps at 1000)
        #[arg(long)]
        limit: Option<i64>,
        /// Resolve content and suppression without claiming or sending
        #[arg(long)]
        dry_run: bool,
    },
    /// Schedule day 3/7/14 check-ins for an assessment
    Enqueue {
        #[arg(long)]
        assessment_id: Uuid,
        /// Delivery channel ("email" or "sms")
        #[arg(long, default_value = "email")]
        channel: Channel,
        /// Completion time (RFC3339). Defaults to the assessment's creation time.
        #[arg(long)]
        completed_at: Option<String>,
    },
    /// Move a failed queue item back to queued
    Retry {
        #[arg(long)]
        id: Uuid,
    },
    /// Remove all check-in data for an assessment
    Erase {
        #[arg(long)]
        assessment_id: Uuid,
    },
}

pub async fn run(api_url: &str, token: Option<&str>, command: CheckinCommands) -> i32 {
    let token = require_token(token);
    match command {
        CheckinCommands::Dispatch { limit, dry_run } => {
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/checkins/dispatch",
                Some(token),
                None,
                &dispatch_query(limit, dry_run),
            )
            .await
        }
        CheckinCommands::Enqueue {
            assessment_id,
            channel,
            completed_at,
        } => {
            let body = match enqueue_body(assessment_id, channel, completed_at.as_deref()) {
                Ok(body) => body,
                Err(e) => exit_error(&e, Some("Use RFC3339, e.g. 2026-03-01T09:00:00Z")),
            };
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/checkins/enqueue",
                Some(token),
                Some(body),
                &[],
            )
            .await
        }
        CheckinCommands::Retry { id } => {
            api_request(
                api_url,
                reqwest::Method::POST,
                &format!("/v1/checkins/queue/{id}/retry"),
                Some(token),
                None,
                &[],
            )
            .await
        }
        CheckinCommands::Erase { assessment_id } => {
            api_request(
                api_url,
                reqwest::Method::DELETE,
                &format!("/v1/assessments/{assessment_id}/checkins"),
                Some(token),
                None,
                &[],
            )
            .await
        }
    }
}

fn dispatch_query(limit: Option<i64>, dry_run: bool) -> Vec<(String, String)> {
    let mut query = Vec::new();
    if let Some(l) = limit {
        query.push(("limit".to_string(), l.to_string()));
    }
    if dry_run {
        query.push(("dry_run".to_string(), "true".to_string()));
    }
    query
}

fn enqueue_body(
    assessment_id: Uuid,
    channel: Channel,
    completed_at: Option<&str>,
) -> Result<serde_json::Value, String> {
    let mut body = json!({
        "assessment_id": assessment_id,
        "channel": channel,
    });
    if let Some(raw) = completed_at {
        let parsed = chrono::DateTime::parse_from_rfc3339(raw)
            .map_err(|e| format!("Invalid --completed-at '{raw}': {e}"))?;
        body["completed_at"] = json!(parsed.with_timezone(&chrono::Utc));
    }
    Ok(body)
}
