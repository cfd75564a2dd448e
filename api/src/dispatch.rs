use std::sync::Arc;

use chrono::{DateTime, Utc};

use checkin_core::checkins::{
    AssessmentProfile, Branch, Channel, CheckInValue, DispatchSummary, QueueItem,
    suppression_reason,
};
use checkin_core::content::{ShellVars, render_shell, with_disclaimer};
use checkin_core::token::{TokenCodec, TokenPayload};

use crate::content::ContentResolver;
use crate::store::{CheckInStore, StoreError};
use crate::transport::{OutboundMessage, Transport};

pub const DEFAULT_BATCH_LIMIT: i64 = 100;
pub const MAX_BATCH_LIMIT: i64 = 1000;

enum Outcome {
    Sent,
    WouldSend,
    Suppressed,
    /// Another run claimed the item first.
    Skipped,
    Failed,
}

/// Sends due check-ins. Each item is claimed with a conditional
/// `queued → sent` update before anything is transmitted, so overlapping runs
/// deliver an item at most once.
pub struct DispatchEngine {
    store: Arc<dyn CheckInStore>,
    content: ContentResolver,
    codec: TokenCodec,
    transport: Arc<dyn Transport>,
    public_base_url: String,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn CheckInStore>,
        content: ContentResolver,
        codec: TokenCodec,
        transport: Arc<dyn Transport>,
        public_base_url: &str,
    ) -> Self {
        Self {
            store,
            content,
            codec,
            transport,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn dispatch_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        dry_run: bool,
    ) -> Result<DispatchSummary, StoreError> {
        let limit = limit.clamp(1, MAX_BATCH_LIMIT);
        let items = self.store.due_items(now, limit).await?;

        let mut summary = DispatchSummary {
            total: items.len() as u32,
            dry_run,
            ..Default::default()
        };

        for item in &items {
            match self.process_item(item, now, dry_run).await {
                Ok(Outcome::Sent) | Ok(Outcome::WouldSend) => summary.processed += 1,
                Ok(Outcome::Suppressed) => {
                    summary.processed += 1;
                    summary.suppressed += 1;
                }
                Ok(Outcome::Skipped) => {}
                Ok(Outcome::Failed) => summary.errors += 1,
                Err(e) => {
                    tracing::error!(
                        queue_item_id = %item.id,
                        assessment_id = %item.assessment_id,
                        error = %e,
                        "check-in dispatch failed"
                    );
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            suppressed = summary.suppressed,
            errors = summary.errors,
            total = summary.total,
            dry_run,
            "check-in dispatch finished"
        );
        Ok(summary)
    }

    async fn process_item(
        &self,
        item: &QueueItem,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<Outcome, StoreError> {
        let Some(profile) = self.store.assessment(item.assessment_id).await? else {
            return self.fail_unsendable(item, now, dry_run, "assessment not found").await;
        };

        let has_red_flag = self.store.has_red_flag(item.assessment_id).await?;
        if let Some(reason) = suppression_reason(&profile, item.channel, has_red_flag) {
            if !dry_run && !self.store.claim_item(item.id, now).await? {
                return Ok(Outcome::Skipped);
            }
            tracing::info!(
                queue_item_id = %item.id,
                assessment_id = %item.assessment_id,
                day = item.day,
                channel = %item.channel,
                reason = %reason,
                dry_run,
                "check-in suppressed"
            );
            return Ok(Outcome::Suppressed);
        }

        let Some(recipient) = recipient_for(&profile, item.channel) else {
            return self.fail_unsendable(item, now, dry_run, "no recipient for channel").await;
        };

        let message = self.build_message(item, &profile, recipient, now).await?;

        if dry_run {
            tracing::info!(
                queue_item_id = %item.id,
                assessment_id = %item.assessment_id,
                day = item.day,
                channel = %item.channel,
                "dry run, check-in would be sent"
            );
            return Ok(Outcome::WouldSend);
        }

        if !self.store.claim_item(item.id, now).await? {
            tracing::debug!(queue_item_id = %item.id, "check-in already claimed");
            return Ok(Outcome::Skipped);
        }

        match self.transport.send(&message).await {
            Ok(()) => {
                tracing::info!(
                    queue_item_id = %item.id,
                    assessment_id = %item.assessment_id,
                    day = item.day,
                    channel = %item.channel,
                    "check-in sent"
                );
                Ok(Outcome::Sent)
            }
            Err(e) => {
                self.store.mark_failed(item.id, &e.to_string()).await?;
                tracing::warn!(
                    queue_item_id = %item.id,
                    assessment_id = %item.assessment_id,
                    day = item.day,
                    channel = %item.channel,
                    error = %e,
                    "check-in transport failed"
                );
                Ok(Outcome::Failed)
            }
        }
    }

    /// Items that can never be sent move to `failed` so they stop reappearing.
    async fn fail_unsendable(
        &self,
        item: &QueueItem,
        now: DateTime<Utc>,
        dry_run: bool,
        reason: &str,
    ) -> Result<Outcome, StoreError> {
        tracing::warn!(
            queue_item_id = %item.id,
            assessment_id = %item.assessment_id,
            channel = %item.channel,
            reason,
            "check-in cannot be sent"
        );
        if dry_run {
            return Ok(Outcome::Failed);
        }
        if !self.store.claim_item(item.id, now).await? {
            return Ok(Outcome::Skipped);
        }
        self.store.mark_failed(item.id, reason).await?;
        Ok(Outcome::Failed)
    }

    async fn build_message(
        &self,
        item: &QueueItem,
        profile: &AssessmentProfile,
        recipient: &str,
        now: DateTime<Utc>,
    ) -> Result<OutboundMessage, StoreError> {
        let branch = self
            .store
            .latest_branch_before(item.assessment_id, item.day)
            .await?
            .unwrap_or(Branch::Initial);

        let template = self
            .content
            .resolve_template(item.day, branch, item.channel)
            .await;
        let insert = self
            .content
            .resolve_insert_text(&profile.diagnosis_code, item.day, branch)
            .await;
        let encouragement = self.content.resolve_encouragement_text().await;

        let [better_url, same_url, worse_url] =
            CheckInValue::ALL.map(|value| self.reply_url(item, value, now));

        let vars = ShellVars {
            day: item.day,
            insert: &insert,
            encouragement: &encouragement,
            better_url: &better_url,
            same_url: &same_url,
            worse_url: &worse_url,
        };
        let body = with_disclaimer(
            &render_shell(&template.shell_text, &vars),
            &template.disclaimer_text,
        );
        let subject = render_shell(&template.subject, &vars);

        Ok(OutboundMessage {
            channel: item.channel,
            to: recipient.to_string(),
            subject,
            body,
        })
    }

    fn reply_url(&self, item: &QueueItem, value: CheckInValue, now: DateTime<Utc>) -> String {
        let token = self.codec.sign_at(
            &TokenPayload::reply(item.assessment_id, item.day, value),
            now,
        );
        format!("{}/checkin/reply?token={token}", self.public_base_url)
    }
}

fn recipient_for(profile: &AssessmentProfile, channel: Channel) -> Option<&str> {
    let recipient = match channel {
        Channel::Email => profile.email.as_deref(),
        Channel::Sms => profile.phone.as_deref(),
    };
    recipient.map(str::trim).filter(|r| !r.is_empty())
}
