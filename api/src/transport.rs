use std::time::Duration;

use async_trait::async_trait;

use checkin_core::checkins::Channel;
use checkin_core::inbound::mask_phone;

use crate::config::{ResendConfig, TwilioConfig};

const RESEND_URL: &str = "https://api.resend.com/emails";
const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
/// Upper bound for one provider call; dispatch sends items one after another.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub to: String,
    /// Empty for SMS.
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{0} transport is not configured")]
    NotConfigured(Channel),
    #[error("provider rejected message: {status} {body}")]
    Rejected { status: u16, body: String },
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Outbound delivery seam. Implementations must not retry on their own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

/// Email through Resend, SMS through Twilio's Messages API.
pub struct ChannelTransport {
    client: reqwest::Client,
    resend: Option<ResendConfig>,
    twilio: Option<TwilioConfig>,
}

impl ChannelTransport {
    pub fn new(resend: Option<ResendConfig>, twilio: Option<TwilioConfig>) -> Self {
        if resend.is_none() {
            tracing::warn!("RESEND_API_KEY not set, email check-ins will fail");
        }
        if twilio.is_none() {
            tracing::warn!("TWILIO_* not set, SMS check-ins will fail");
        }
        Self {
            client: http_client(PROVIDER_TIMEOUT),
            resend,
            twilio,
        }
    }

    async fn send_email(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let resend = self
            .resend
            .as_ref()
            .ok_or(TransportError::NotConfigured(Channel::Email))?;

        let resp = self
            .client
            .post(RESEND_URL)
            .header("Authorization", format!("Bearer {}", resend.api_key))
            .json(&serde_json::json!({
                "from": resend.from,
                "to": [message.to],
                "subject": message.subject,
                "text": message.body,
            }))
            .send()
            .await?;

        ensure_success(resp).await
    }

    async fn send_sms(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let twilio = self
            .twilio
            .as_ref()
            .ok_or(TransportError::NotConfigured(Channel::Sms))?;

        let url = format!(
            "{TWILIO_API_BASE}/Accounts/{}/Messages.json",
            twilio.account_sid
        );
        let resp = self
            .client
            .post(url)
            .basic_auth(&twilio.account_sid, Some(&twilio.auth_token))
            .form(&[
                ("To", message.to.as_str()),
                ("From", twilio.from_number.as_str()),
                ("Body", message.body.as_str()),
            ])
            .send()
            .await?;

        ensure_success(resp).await
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<(), TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(TransportError::Rejected {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let result = match message.channel {
            Channel::Email => self.send_email(message).await,
            Channel::Sms => self.send_sms(message).await,
        };
        match &result {
            Ok(()) => tracing::debug!(channel = %message.channel, "provider accepted message"),
            Err(e) => {
                let to = match message.channel {
                    Channel::Sms => mask_phone(&message.to),
                    Channel::Email => "<email>".to_string(),
                };
                tracing::error!(channel = %message.channel, to = %to, error = %e, "provider send failed");
            }
        }
        result
    }
}


fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build provider http client, using defaults");
            reqwest::Client::new()
        })
}
