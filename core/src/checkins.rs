use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Days after assessment completion on which a check-in is scheduled.
pub const CHECK_IN_DAYS: [i32; 3] = [3, 7, 14];

/// Valid range for any recorded response day (SMS replies may land on any day).
pub const FIRST_RESPONSE_DAY: i32 = 1;
pub const LAST_RESPONSE_DAY: i32 = 14;

/// Error returned when a stored or submitted enum string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                match raw.trim().to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: raw.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

string_enum!(Channel, "channel", { Email => "email", Sms => "sms" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Sent,
    Failed,
}

string_enum!(QueueStatus, "queue status", {
    Queued => "queued",
    Sent => "sent",
    Failed => "failed",
});

/// Outcome a recipient reports for a check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckInValue {
    Better,
    Same,
    Worse,
}

string_enum!(CheckInValue, "check-in value", {
    Better => "better",
    Same => "same",
    Worse => "worse",
});

impl CheckInValue {
    pub const ALL: [CheckInValue; 3] = [Self::Better, Self::Same, Self::Worse];
}

/// Content branch: an outcome, or `Initial` for first-contact wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Initial,
    Better,
    Same,
    Worse,
}

string_enum!(Branch, "branch", {
    Initial => "initial",
    Better => "better",
    Same => "same",
    Worse => "worse",
});

impl From<CheckInValue> for Branch {
    fn from(value: CheckInValue) -> Self {
        match value {
            CheckInValue::Better => Branch::Better,
            CheckInValue::Same => Branch::Same,
            CheckInValue::Worse => Branch::Worse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    EmailLink,
    SmsReply,
}

string_enum!(ResponseSource, "response source", {
    EmailLink => "email_link",
    SmsReply => "sms_reply",
});

/// Product tier of the assessment owner. Coaching replaces automated check-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Report,
    Coaching,
}

string_enum!(Tier, "tier", {
    Free => "free",
    Report => "report",
    Coaching => "coaching",
});

/// A scheduled check-in message for one assessment/day/channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueueItem {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub day: i32,
    pub due_at: DateTime<Utc>,
    pub template_key: String,
    pub channel: Channel,
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Request to schedule (or reschedule) one check-in.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueItem {
    pub assessment_id: Uuid,
    pub day: i32,
    pub due_at: DateTime<Utc>,
    pub channel: Channel,
}

impl NewQueueItem {
    /// Base template key for the day; the branch suffix is chosen at dispatch time.
    pub fn template_key(&self) -> String {
        format!("day{}", self.day)
    }
}

/// Build the standard day 3/7/14 schedule relative to assessment completion.
pub fn schedule_for(
    assessment_id: Uuid,
    completed_at: DateTime<Utc>,
    channel: Channel,
) -> Vec<NewQueueItem> {
    CHECK_IN_DAYS
        .iter()
        .map(|day| NewQueueItem {
            assessment_id,
            day: *day,
            due_at: completed_at + chrono::Duration::days(i64::from(*day)),
            channel,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckInResponse {
    pub assessment_id: Uuid,
    pub day: i32,
    pub value: CheckInValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pain_score: Option<i32>,
    pub source: ResponseSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One write against the response table, keyed on `(assessment_id, day)`.
///
/// Present fields overwrite stored ones, except `note`: once a note is stored
/// it is kept, and a missing `pain_score` keeps the stored score.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseWrite {
    pub assessment_id: Uuid,
    pub day: i32,
    pub value: CheckInValue,
    pub pain_score: Option<i32>,
    pub source: ResponseSource,
    pub note: Option<String>,
}

impl ResponseWrite {
    /// Merge this write into an existing row (or create one).
    pub fn apply(self, existing: Option<&CheckInResponse>, now: DateTime<Utc>) -> CheckInResponse {
        match existing {
            Some(current) => CheckInResponse {
                assessment_id: current.assessment_id,
                day: current.day,
                value: self.value,
                pain_score: self.pain_score.or(current.pain_score),
                source: self.source,
                note: current.note.clone().or(self.note),
                created_at: current.created_at,
            },
            None => CheckInResponse {
                assessment_id: self.assessment_id,
                day: self.day,
                value: self.value,
                pain_score: self.pain_score,
                source: self.source,
                note: self.note,
                created_at: now,
            },
        }
    }
}

pub const ALERT_TYPE_RED_FLAG: &str = "red_flag";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AlertPayload {
    pub day: i32,
    pub matched: Vec<String>,
    pub note_excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Alert {
    pub id: Uuid,
    pub assessment_id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub payload: AlertPayload,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub key: String,
    pub subject: String,
    pub shell_text: String,
    pub disclaimer_text: String,
    pub channel: Channel,
}

/// What dispatch and inbound processing need to know about an assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentProfile {
    pub id: Uuid,
    pub diagnosis_code: String,
    pub initial_score: Option<i32>,
    pub tier: Tier,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub marketing_opt_out: bool,
    pub sms_opt_out: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    RedFlag,
    TierUpgrade,
    MarketingOptOut,
    SmsOptOut,
}

string_enum!(SuppressionReason, "suppression reason", {
    RedFlag => "red_flag",
    TierUpgrade => "tier_upgrade",
    MarketingOptOut => "marketing_opt_out",
    SmsOptOut => "sms_opt_out",
});

/// Decide whether a due check-in must be withheld. Safety outranks consent,
/// consent outranks relevance.
pub fn suppression_reason(
    profile: &AssessmentProfile,
    channel: Channel,
    has_red_flag: bool,
) -> Option<SuppressionReason> {
    if has_red_flag {
        return Some(SuppressionReason::RedFlag);
    }
    if profile.marketing_opt_out {
        return Some(SuppressionReason::MarketingOptOut);
    }
    if channel == Channel::Sms && profile.sms_opt_out {
        return Some(SuppressionReason::SmsOptOut);
    }
    if profile.tier >= Tier::Coaching {
        return Some(SuppressionReason::TierUpgrade);
    }
    None
}

/// Result of one dispatch invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DispatchSummary {
    /// Items handled to completion (sent, or would be sent in a dry run, plus suppressed).
    pub processed: u32,
    /// Subset of `processed` withheld by suppression policy.
    pub suppressed: u32,
    /// Items whose transport or preparation failed.
    pub errors: u32,
    /// Items selected as due.
    pub total: u32,
    pub dry_run: bool,
}
