//! Offline reply-token tooling for support staff: mint a link for a patient
//! who lost their email, or inspect a token pasted from a bug report.

use chrono::Duration;
use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use checkin_core::checkins::CheckInValue;
use checkin_core::token::{TokenCodec, TokenPayload};

use crate::util::exit_error;

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Mint a reply token (and link, if --base-url is given)
    Sign {
        #[arg(long)]
        assessment_id: Uuid,
        /// Check-in day (1-14)
        #[arg(long)]
        day: i32,
        /// Outcome bound into the token ("better", "same", "worse")
        #[arg(long)]
        value: CheckInValue,
        /// Public base URL used to build the reply link
        #[arg(long, env = "PUBLIC_BASE_URL")]
        base_url: Option<String>,
    },
    /// Decode and verify a token
    Verify {
        token: String,
    },
}

pub fn run(secret: Option<&str>, ttl_days: i64, command: TokenCommands) -> i32 {
    let codec = match codec(secret, ttl_days) {
        Ok(c) => c,
        Err(e) => exit_error(&e, Some("Set CHECKIN_TOKEN_SECRET to the server's signing secret.")),
    };

    let output = match command {
        TokenCommands::Sign {
            assessment_id,
            day,
            value,
            base_url,
        } => {
            if !(1..=14).contains(&day) {
                exit_error(&format!("--day must be between 1 and 14, got {day}"), None);
            }
            let token = codec.sign(&TokenPayload::reply(assessment_id, day, value));
            let mut out = json!({ "token": token });
            if let Some(base) = base_url {
                out["url"] = json!(reply_link(&base, &token));
            }
            out
        }
        TokenCommands::Verify { token } => match codec.verify(&token) {
            Some(payload) => json!({
                "valid": true,
                "assessment_id": payload.assessment_id,
                "day": payload.day,
                "value": payload.value,
                "purpose": payload.purpose,
            }),
            None => {
                println!("{:#}", json!({ "valid": false }));
                return 1;
            }
        },
    };

    println!("{output:#}");
    0
}

fn codec(secret: Option<&str>, ttl_days: i64) -> Result<TokenCodec, String> {
    let secret = secret
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| "CHECKIN_TOKEN_SECRET is not set".to_string())?;
    TokenCodec::new(secret.trim().as_bytes(), Duration::days(ttl_days)).map_err(|e| e.to_string())
}

fn reply_link(base_url: &str, token: &str) -> String {
    format!("{}/checkin/reply?token={token}", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "cli-test-secret-0123456789abcdefghij";

    #[test]
    fn signed_token_verifies_with_same_secret() {
        let codec = codec(Some(SECRET), 21).unwrap();
        let id = Uuid::now_v7();
        let token = codec.sign(&TokenPayload::reply(id, 7, CheckInValue::Worse));
        let payload = codec.verify(&token).unwrap();
        assert_eq!(payload.assessment_id, id);
        assert_eq!(payload.day, 7);
        assert_eq!(payload.value, Some(CheckInValue::Worse));
    }

    #[test]
    fn missing_or_short_secret_is_rejected() {
        assert!(codec(None, 21).is_err());
        assert!(codec(Some("   "), 21).is_err());
        assert!(codec(Some("short"), 21).is_err());
    }

    #[test]
    fn reply_link_trims_trailing_slash() {
        assert_eq!(
            reply_link("https://care.example.com/", "abc.def"),
            "https://care.example.com/checkin/reply?token=abc.def"
        );
    }
}
