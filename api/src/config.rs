use std::time::Duration;

use checkin_core::token::{DEFAULT_TTL_DAYS, MIN_SECRET_LEN};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_EMAIL_FROM: &str = "Check-ins <checkins@example.com>";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Clone)]
pub struct ResendConfig {
    pub api_key: String,
    pub from: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub token_secret: String,
    pub token_ttl: chrono::Duration,
    pub dispatch_token: String,
    pub public_base_url: String,
    pub twilio: Option<TwilioConfig>,
    pub resend: Option<ResendConfig>,
    pub webhook_timeout: Duration,
    pub require_https: bool,
    pub port: u16,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("public_base_url", &self.public_base_url)
            .field("token_ttl_days", &self.token_ttl.num_days())
            .field("twilio_configured", &self.twilio.is_some())
            .field("resend_configured", &self.resend.is_some())
            .field("webhook_timeout", &self.webhook_timeout)
            .field("require_https", &self.require_https)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let token_secret =
            get("CHECKIN_TOKEN_SECRET").ok_or(ConfigError::Missing("CHECKIN_TOKEN_SECRET"))?;
        if token_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "CHECKIN_TOKEN_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }

        let ttl_days = match get("CHECKIN_TOKEN_TTL_DAYS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|days| (1..=90).contains(days))
                .ok_or_else(|| ConfigError::Invalid {
                    name: "CHECKIN_TOKEN_TTL_DAYS",
                    reason: format!("expected 1..=90, got '{raw}'"),
                })?,
            None => DEFAULT_TTL_DAYS,
        };

        let dispatch_token =
            get("CHECKIN_DISPATCH_TOKEN").ok_or(ConfigError::Missing("CHECKIN_DISPATCH_TOKEN"))?;

        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&public_base_url).map_err(|e| ConfigError::Invalid {
            name: "PUBLIC_BASE_URL",
            reason: e.to_string(),
        })?;

        let twilio = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_FROM_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
            }),
            _ => None,
        };

        let resend = get("RESEND_API_KEY").map(|api_key| ResendConfig {
            api_key,
            from: get("EMAIL_FROM").unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
        });

        let webhook_timeout_ms = match get("CHECKIN_WEBHOOK_TIMEOUT_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: "CHECKIN_WEBHOOK_TIMEOUT_MS",
                reason: e.to_string(),
            })?,
            None => DEFAULT_WEBHOOK_TIMEOUT_MS,
        };

        let require_https = get("CHECKIN_REQUIRE_HTTPS")
            .map(|v| v == "true")
            .unwrap_or(false);

        let port = get("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            database_url,
            token_secret,
            token_ttl: chrono::Duration::days(ttl_days),
            dispatch_token,
            public_base_url,
            twilio,
            resend,
            webhook_timeout: Duration::from_millis(webhook_timeout_ms),
            require_https,
            port,
        })
    }
}
