use std::sync::Arc;

use checkin_core::token::{TokenCodec, TokenError};

use crate::config::AppConfig;
use crate::content::ContentResolver;
use crate::dispatch::DispatchEngine;
use crate::inbound::InboundProcessor;
use crate::store::CheckInStore;
use crate::transport::Transport;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CheckInStore>,
    pub codec: TokenCodec,
    pub dispatch: Arc<DispatchEngine>,
    pub inbound: Arc<InboundProcessor>,
    pub dispatch_token: Arc<str>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CheckInStore>,
        transport: Arc<dyn Transport>,
        config: &AppConfig,
    ) -> Result<Self, TokenError> {
        let codec = TokenCodec::new(config.token_secret.as_bytes(), config.token_ttl)?;

        let dispatch = DispatchEngine::new(
            store.clone(),
            ContentResolver::new(store.clone()),
            codec.clone(),
            transport,
            &config.public_base_url,
        );
        let inbound = InboundProcessor::new(
            store.clone(),
            config.twilio.as_ref().map(|t| t.auth_token.clone()),
            config.webhook_timeout,
        );

        Ok(Self {
            store,
            codec,
            dispatch: Arc::new(dispatch),
            inbound: Arc::new(inbound),
            dispatch_token: Arc::from(config.dispatch_token.as_str()),
        })
    }
}
