//! Pure decision logic for inbound SMS replies.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::checkins::{CheckInValue, FIRST_RESPONSE_DAY, LAST_RESPONSE_DAY};

pub const MAX_PAIN_SCORE: i32 = 10;

const OPT_OUT_KEYWORDS: &[&str] = &[
    "STOP",
    "STOPALL",
    "UNSUBSCRIBE",
    "CANCEL",
    "END",
    "QUIT",
    "OPTOUT",
];
const HELP_KEYWORDS: &[&str] = &["HELP", "INFO"];

static SCORE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,2}$").expect("static score pattern"));

pub mod replies {
    pub const OPT_OUT_CONFIRMED: &str =
        "You're unsubscribed from check-in texts. You won't receive more messages.";
    pub const HELP: &str = "Reply with a number from 0 (no pain) to 10 (worst pain) to log today's check-in. Reply STOP to opt out.";
    pub const RETRY: &str =
        "Sorry, we didn't catch that. Please reply with a single number from 0 to 10.";
    pub const UNKNOWN_SENDER: &str =
        "We couldn't find an active check-in for this number. No action was taken.";
    pub const REJECTED: &str = "Unable to process this message.";
    pub const TEMPORARY_ISSUE: &str =
        "We're having a temporary issue recording your reply. Please try again later.";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundIntent {
    OptOut,
    Help,
    Score(i32),
    Unrecognized,
}

/// Uppercase ASCII letters only, so "Stop." and " s t o p" both read as STOP.
pub fn normalize_keyword(body: &str) -> String {
    body.chars()
        .filter(|ch| ch.is_ascii_alphabetic())
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

/// Keywords are checked before any numeric parsing.
pub fn classify(body: &str) -> InboundIntent {
    let keyword = normalize_keyword(body);
    if OPT_OUT_KEYWORDS.contains(&keyword.as_str()) {
        return InboundIntent::OptOut;
    }
    if HELP_KEYWORDS.contains(&keyword.as_str()) {
        return InboundIntent::Help;
    }
    parse_pain_score(body)
        .map(InboundIntent::Score)
        .unwrap_or(InboundIntent::Unrecognized)
}

pub fn parse_pain_score(body: &str) -> Option<i32> {
    let trimmed = body.trim();
    if !SCORE_PATTERN.is_match(trimmed) {
        return None;
    }
    let score: i32 = trimmed.parse().ok()?;
    (0..=MAX_PAIN_SCORE).contains(&score).then_some(score)
}

/// Whole days since the assessment was created, clamped to the response window.
pub fn elapsed_day(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    let days = (now - created_at).num_days();
    days.clamp(i64::from(FIRST_RESPONSE_DAY), i64::from(LAST_RESPONSE_DAY)) as i32
}

/// Pick the day an SMS reply answers.
///
/// Candidates are the scheduled SMS days, or every day in the window when none
/// are scheduled. The first unanswered candidate wins; once all are answered
/// the elapsed-time day is used.
pub fn resolve_target_day(scheduled_days: &[i32], answered_days: &[i32], elapsed: i32) -> i32 {
    let candidates = candidate_days(scheduled_days);
    let answered: BTreeSet<i32> = answered_days.iter().copied().collect();

    candidates
        .into_iter()
        .find(|day| !answered.contains(day))
        .unwrap_or_else(|| elapsed.clamp(FIRST_RESPONSE_DAY, LAST_RESPONSE_DAY))
}

/// Days an SMS reply can answer: the scheduled SMS days, or every day
/// in the response window when nothing is scheduled.
fn candidate_days(scheduled_days: &[i32]) -> BTreeSet<i32> {
    if scheduled_days.is_empty() {
        (FIRST_RESPONSE_DAY..=LAST_RESPONSE_DAY).collect()
    } else {
        scheduled_days.iter().copied().collect()
    }
}

/// Consecutive answered days from the start of the day sequence, stopping at
/// the first gap. With no schedule the sequence is 1, 2, 3, ...
pub fn response_streak(scheduled_days: &[i32], days_with_scores: &[i32]) -> u32 {
    let answered: BTreeSet<i32> = days_with_scores.iter().copied().collect();
    candidate_days(scheduled_days)
        .into_iter()
        .take_while(|day| answered.contains(day))
        .count() as u32
}

/// Map a pain score onto better/same/worse relative to the initial score.
/// Lower pain is better; any difference counts.
pub fn legacy_value(score: i32, initial_score: Option<i32>) -> CheckInValue {
    match initial_score {
        Some(initial) if score < initial => CheckInValue::Better,
        Some(initial) if score > initial => CheckInValue::Worse,
        _ => CheckInValue::Same,
    }
}

pub fn acknowledgment(score: i32, day: i32, streak: u32) -> String {
    let mut reply = format!("Thanks! We logged your pain as {score}/10 for day {day}.");
    if streak > 1 {
        reply.push_str(&format!(" That's {streak} days in a row."));
    }
    reply
}

/// Keep the country code and last two digits for logs.
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|ch| ch.is_ascii_digit()).collect();
    if digits.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = digits[digits.len() - 2..].iter().collect();
    let head: String = digits[..2].iter().collect();
    format!("+{head}***{tail}")
}
