use std::sync::Arc;

use rand::seq::SliceRandom;

use checkin_core::checkins::{Branch, Channel, MessageTemplate};
use checkin_core::content::{
    DEFAULT_ENCOURAGEMENT, ENCOURAGEMENT_POOL_LIMIT, builtin_template, insert_candidates,
    template_candidates,
};

use crate::store::CheckInStore;

/// Looks up micro-copy, encouragement lines, and message shells with
/// deterministic fallbacks. Lookup failures never surface to callers.
#[derive(Clone)]
pub struct ContentResolver {
    store: Arc<dyn CheckInStore>,
}

impl ContentResolver {
    pub fn new(store: Arc<dyn CheckInStore>) -> Self {
        Self { store }
    }

    /// First non-empty insert along the candidate order, or `""` to omit the block.
    pub async fn resolve_insert_text(&self, diagnosis_code: &str, day: i32, branch: Branch) -> String {
        for key in insert_candidates(diagnosis_code, branch) {
            match self
                .store
                .find_insert(&key.diagnosis_code, day, key.branch)
                .await
            {
                Ok(Some(text)) if !text.trim().is_empty() => return text.trim().to_string(),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        diagnosis_code = %key.diagnosis_code,
                        day,
                        branch = %key.branch,
                        error = %e,
                        "insert lookup failed, omitting insert"
                    );
                    return String::new();
                }
            }
        }
        String::new()
    }

    pub async fn resolve_encouragement_text(&self) -> String {
        let pool = match self.store.encouragement_pool(ENCOURAGEMENT_POOL_LIMIT).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "encouragement lookup failed, using default");
                return DEFAULT_ENCOURAGEMENT.to_string();
            }
        };
        pool.choose(&mut rand::thread_rng())
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .unwrap_or_else(|| DEFAULT_ENCOURAGEMENT.to_string())
    }

    pub async fn resolve_template(&self, day: i32, branch: Branch, channel: Channel) -> MessageTemplate {
        for key in template_candidates(day, branch) {
            match self.store.find_template(&key, channel).await {
                Ok(Some(template)) => return template,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        template_key = %key,
                        channel = %channel,
                        error = %e,
                        "template lookup failed, using built-in shell"
                    );
                    break;
                }
            }
        }
        builtin_template(day, branch, channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn resolver(store: &Arc<MemoryStore>) -> ContentResolver {
        ContentResolver::new(store.clone())
    }

    #[tokio::test]
    async fn unknown_diagnosis_falls_back_to_generic() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_insert("generic", 7, Branch::Worse, "Flare-ups are common in week one.")
            .await;
        let text = resolver(&store)
            .resolve_insert_text("unknown_code", 7, Branch::Worse)
            .await;
        assert_eq!(text, "Flare-ups are common in week one.");
    }

    #[tokio::test]
    async fn missing_insert_is_empty() {
        let store = Arc::new(MemoryStore::new());
        let text = resolver(&store)
            .resolve_insert_text("unknown_code", 7, Branch::Worse)
            .await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn diagnosis_specific_beats_generic() {
        let store = Arc::new(MemoryStore::new());
        store.add_insert("generic", 3, Branch::Initial, "generic").await;
        store.add_insert("sciatica", 3, Branch::Same, "sciatica same").await;
        let text = resolver(&store)
            .resolve_insert_text("sciatica", 3, Branch::Initial)
            .await;
        assert_eq!(text, "sciatica same");
    }

    #[tokio::test]
    async fn blank_inserts_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.add_insert("sciatica", 3, Branch::Better, "   ").await;
        store.add_insert("generic", 3, Branch::Better, "Nice work.").await;
        let text = resolver(&store)
            .resolve_insert_text("sciatica", 3, Branch::Better)
            .await;
        assert_eq!(text, "Nice work.");
    }

    #[tokio::test]
    async fn store_errors_degrade_to_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.add_encouragement("You've got this.").await;
        store.fail_content_reads(true);
        let resolver = resolver(&store);

        assert_eq!(resolver.resolve_insert_text("generic", 3, Branch::Initial).await, "");
        assert_eq!(resolver.resolve_encouragement_text().await, DEFAULT_ENCOURAGEMENT);
        let template = resolver.resolve_template(3, Branch::Better, Channel::Sms).await;
        assert_eq!(template, builtin_template(3, Branch::Better, Channel::Sms));
    }

    #[tokio::test]
    async fn encouragement_comes_from_pool() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);
        assert_eq!(resolver.resolve_encouragement_text().await, DEFAULT_ENCOURAGEMENT);

        store.add_encouragement("One").await;
        store.add_encouragement("Two").await;
        let line = resolver.resolve_encouragement_text().await;
        assert!(line == "One" || line == "Two", "unexpected line {line}");
    }

    #[tokio::test]
    async fn template_falls_back_to_initial_then_builtin() {
        let store = Arc::new(MemoryStore::new());
        let initial = MessageTemplate {
            key: "day7.initial".to_string(),
            subject: "Day 7".to_string(),
            shell_text: "Day {{day}} {{insert}}".to_string(),
            disclaimer_text: String::new(),
            channel: Channel::Email,
        };
        store.add_template(initial.clone()).await;
        let resolver = resolver(&store);

        assert_eq!(resolver.resolve_template(7, Branch::Worse, Channel::Email).await, initial);
        assert_eq!(
            resolver.resolve_template(7, Branch::Worse, Channel::Sms).await,
            builtin_template(7, Branch::Worse, Channel::Sms)
        );
    }
}
