//! Narrow persistence contract consumed by dispatch, inbound, and reply handling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use checkin_core::checkins::{
    Alert, AlertPayload, AssessmentProfile, Branch, Channel, CheckInResponse, MessageTemplate,
    NewQueueItem, QueueItem, ResponseWrite,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct ErasureCounts {
    pub queue_items_deleted: u64,
    pub responses_deleted: u64,
    pub alerts_deleted: u64,
}

#[async_trait]
pub trait CheckInStore: Send + Sync {
    // ── queue ──────────────────────────────────

    /// Insert or refresh a schedule row keyed on `(assessment_id, day, channel)`.
    /// Rows that already left `queued` are returned unchanged.
    async fn enqueue(&self, item: &NewQueueItem) -> Result<QueueItem, StoreError>;

    /// Queued items with `due_at <= now`, oldest first.
    async fn due_items(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<QueueItem>, StoreError>;

    /// `queued → sent` as one conditional update. `false` means another run got it.
    async fn claim_item(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// `sent → failed` for a claimed item whose transmission failed.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Operator override: `failed → queued`, due immediately.
    async fn requeue_failed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn queue_item(&self, id: Uuid) -> Result<Option<QueueItem>, StoreError>;

    async fn scheduled_days(
        &self,
        assessment_id: Uuid,
        channel: Channel,
    ) -> Result<Vec<i32>, StoreError>;

    // ── assessments / consent ──────────────────

    async fn assessment(&self, id: Uuid) -> Result<Option<AssessmentProfile>, StoreError>;

    /// Most recent assessment registered for a phone number.
    async fn assessment_for_phone(
        &self,
        phone: &str,
    ) -> Result<Option<AssessmentProfile>, StoreError>;

    async fn record_sms_opt_out(&self, phone: &str) -> Result<(), StoreError>;

    // ── responses ──────────────────────────────

    async fn responses(&self, assessment_id: Uuid) -> Result<Vec<CheckInResponse>, StoreError>;

    /// Conflict-resolving write on `(assessment_id, day)`; see [`ResponseWrite`].
    async fn upsert_response(&self, write: ResponseWrite) -> Result<CheckInResponse, StoreError>;

    /// Value of the latest response recorded for a day before `day`.
    async fn latest_branch_before(
        &self,
        assessment_id: Uuid,
        day: i32,
    ) -> Result<Option<Branch>, StoreError>;

    // ── alerts ─────────────────────────────────

    async fn insert_alert(
        &self,
        assessment_id: Uuid,
        payload: &AlertPayload,
    ) -> Result<Alert, StoreError>;

    async fn has_red_flag(&self, assessment_id: Uuid) -> Result<bool, StoreError>;

    async fn list_alerts(&self, limit: i64) -> Result<Vec<Alert>, StoreError>;

    async fn dismiss_alert(&self, id: Uuid) -> Result<bool, StoreError>;

    // ── content ────────────────────────────────

    async fn find_insert(
        &self,
        diagnosis_code: &str,
        day: i32,
        branch: Branch,
    ) -> Result<Option<String>, StoreError>;

    async fn find_template(
        &self,
        key: &str,
        channel: Channel,
    ) -> Result<Option<MessageTemplate>, StoreError>;

    async fn encouragement_pool(&self, limit: i64) -> Result<Vec<String>, StoreError>;

    // ── retention ──────────────────────────────

    async fn erase_assessment(&self, assessment_id: Uuid) -> Result<ErasureCounts, StoreError>;

    async fn ping(&self) -> bool;
}
