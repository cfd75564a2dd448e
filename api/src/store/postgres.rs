use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use checkin_core::checkins::{
    ALERT_TYPE_RED_FLAG, Alert, AlertPayload, AssessmentProfile, Branch, Channel,
    CheckInResponse, MessageTemplate, NewQueueItem, ParseEnumError, QueueItem, ResponseWrite,
};

use super::{CheckInStore, ErasureCounts, StoreError};

const QUEUE_COLUMNS: &str =
    "id, assessment_id, day, due_at, template_key, channel, status, sent_at, last_error";
const RESPONSE_COLUMNS: &str = "assessment_id, day, value, pain_score, source, note, created_at";
const ASSESSMENT_SELECT: &str = "SELECT a.id, a.diagnosis_code, a.initial_score, a.tier, \
     a.email, a.phone, a.marketing_opt_out, \
     EXISTS(SELECT 1 FROM sms_opt_outs o WHERE o.phone = a.phone) AS sms_opt_out, \
     a.created_at \
     FROM assessments a";

/// sqlx-backed store over the check-in tables in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl From<ParseEnumError> for StoreError {
    fn from(err: ParseEnumError) -> Self {
        StoreError::CorruptRow(err.to_string())
    }
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: Uuid,
    assessment_id: Uuid,
    day: i32,
    due_at: DateTime<Utc>,
    template_key: String,
    channel: String,
    status: String,
    sent_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl TryFrom<QueueRow> for QueueItem {
    type Error = StoreError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        Ok(QueueItem {
            id: row.id,
            assessment_id: row.assessment_id,
            day: row.day,
            due_at: row.due_at,
            template_key: row.template_key,
            channel: row.channel.parse()?,
            status: row.status.parse()?,
            sent_at: row.sent_at,
            last_error: row.last_error,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResponseRow {
    assessment_id: Uuid,
    day: i32,
    value: String,
    pain_score: Option<i32>,
    source: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ResponseRow> for CheckInResponse {
    type Error = StoreError;

    fn try_from(row: ResponseRow) -> Result<Self, Self::Error> {
        Ok(CheckInResponse {
            assessment_id: row.assessment_id,
            day: row.day,
            value: row.value.parse()?,
            pain_score: row.pain_score,
            source: row.source.parse()?,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssessmentRow {
    id: Uuid,
    diagnosis_code: String,
    initial_score: Option<i32>,
    tier: String,
    email: Option<String>,
    phone: Option<String>,
    marketing_opt_out: bool,
    sms_opt_out: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<AssessmentRow> for AssessmentProfile {
    type Error = StoreError;

    fn try_from(row: AssessmentRow) -> Result<Self, Self::Error> {
        Ok(AssessmentProfile {
            id: row.id,
            diagnosis_code: row.diagnosis_code,
            initial_score: row.initial_score,
            tier: row.tier.parse()?,
            email: row.email,
            phone: row.phone,
            marketing_opt_out: row.marketing_opt_out,
            sms_opt_out: row.sms_opt_out,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    assessment_id: Uuid,
    #[sqlx(rename = "type")]
    alert_type: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let payload = serde_json::from_value::<AlertPayload>(row.payload)
            .map_err(|e| StoreError::CorruptRow(format!("alert {} payload: {e}", row.id)))?;
        Ok(Alert {
            id: row.id,
            assessment_id: row.assessment_id,
            alert_type: row.alert_type,
            payload,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    key: String,
    channel: String,
    subject: String,
    shell_text: String,
    disclaimer_text: String,
}

#[async_trait]
impl CheckInStore for PgStore {
    async fn enqueue(&self, item: &NewQueueItem) -> Result<QueueItem, StoreError> {
        let upserted = sqlx::query_as::<_, QueueRow>(&format!(
            "INSERT INTO check_in_queue (id, assessment_id, day, due_at, template_key, channel) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (assessment_id, day, channel) DO UPDATE \
             SET due_at = EXCLUDED.due_at, template_key = EXCLUDED.template_key, updated_at = NOW() \
             WHERE check_in_queue.status = 'queued' \
             RETURNING {QUEUE_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(item.assessment_id)
        .bind(item.day)
        .bind(item.due_at)
        .bind(item.template_key())
        .bind(item.channel.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let row = match upserted {
            Some(row) => row,
            // Conflict with a row that already left `queued`: leave it alone.
            None => {
                sqlx::query_as::<_, QueueRow>(&format!(
                    "SELECT {QUEUE_COLUMNS} FROM check_in_queue \
                     WHERE assessment_id = $1 AND day = $2 AND channel = $3"
                ))
                .bind(item.assessment_id)
                .bind(item.day)
                .bind(item.channel.as_str())
                .fetch_one(&self.pool)
                .await?
            }
        };
        row.try_into()
    }

    async fn due_items(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<QueueItem>, StoreError> {
        sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM check_in_queue \
             WHERE status = 'queued' AND due_at <= $1 \
             ORDER BY due_at ASC, id ASC LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(QueueItem::try_from)
        .collect()
    }

    async fn claim_item(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE check_in_queue SET status = 'sent', sent_at = $2, last_error = NULL, \
             updated_at = NOW() WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE check_in_queue SET status = 'failed', sent_at = NULL, last_error = $2, \
             updated_at = NOW() WHERE id = $1 AND status = 'sent'",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn requeue_failed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE check_in_queue SET status = 'queued', due_at = $2, last_error = NULL, \
             updated_at = NOW() WHERE id = $1 AND status = 'failed'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn queue_item(&self, id: Uuid) -> Result<Option<QueueItem>, StoreError> {
        sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM check_in_queue WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(QueueItem::try_from)
        .transpose()
    }

    async fn scheduled_days(
        &self,
        assessment_id: Uuid,
        channel: Channel,
    ) -> Result<Vec<i32>, StoreError> {
        let days = sqlx::query_scalar::<_, i32>(
            "SELECT day FROM check_in_queue WHERE assessment_id = $1 AND channel = $2 ORDER BY day",
        )
        .bind(assessment_id)
        .bind(channel.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(days)
    }

    async fn assessment(&self, id: Uuid) -> Result<Option<AssessmentProfile>, StoreError> {
        sqlx::query_as::<_, AssessmentRow>(&format!("{ASSESSMENT_SELECT} WHERE a.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(AssessmentProfile::try_from)
            .transpose()
    }

    async fn assessment_for_phone(
        &self,
        phone: &str,
    ) -> Result<Option<AssessmentProfile>, StoreError> {
        sqlx::query_as::<_, AssessmentRow>(&format!(
            "{ASSESSMENT_SELECT} WHERE a.phone = $1 ORDER BY a.created_at DESC LIMIT 1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?
        .map(AssessmentProfile::try_from)
        .transpose()
    }

    async fn record_sms_opt_out(&self, phone: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sms_opt_outs (phone) VALUES ($1) ON CONFLICT (phone) DO NOTHING")
            .bind(phone)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn responses(&self, assessment_id: Uuid) -> Result<Vec<CheckInResponse>, StoreError> {
        sqlx::query_as::<_, ResponseRow>(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM check_in_responses WHERE assessment_id = $1 ORDER BY day"
        ))
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CheckInResponse::try_from)
        .collect()
    }

    async fn upsert_response(&self, write: ResponseWrite) -> Result<CheckInResponse, StoreError> {
        sqlx::query_as::<_, ResponseRow>(&format!(
            "INSERT INTO check_in_responses (assessment_id, day, value, pain_score, source, note) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (assessment_id, day) DO UPDATE SET \
                 value = EXCLUDED.value, \
                 pain_score = COALESCE(EXCLUDED.pain_score, check_in_responses.pain_score), \
                 source = EXCLUDED.source, \
                 note = COALESCE(check_in_responses.note, EXCLUDED.note), \
                 updated_at = NOW() \
             RETURNING {RESPONSE_COLUMNS}"
        ))
        .bind(write.assessment_id)
        .bind(write.day)
        .bind(write.value.as_str())
        .bind(write.pain_score)
        .bind(write.source.as_str())
        .bind(write.note.as_deref())
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn latest_branch_before(
        &self,
        assessment_id: Uuid,
        day: i32,
    ) -> Result<Option<Branch>, StoreError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM check_in_responses \
             WHERE assessment_id = $1 AND day < $2 ORDER BY day DESC LIMIT 1",
        )
        .bind(assessment_id)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value.map(|raw| raw.parse::<Branch>()).transpose()?)
    }

    async fn insert_alert(
        &self,
        assessment_id: Uuid,
        payload: &AlertPayload,
    ) -> Result<Alert, StoreError> {
        let payload_json = serde_json::to_value(payload)
            .map_err(|e| StoreError::CorruptRow(format!("alert payload: {e}")))?;
        sqlx::query_as::<_, AlertRow>(
            "INSERT INTO check_in_alerts (id, assessment_id, type, payload) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, assessment_id, type, payload, created_at",
        )
        .bind(Uuid::now_v7())
        .bind(assessment_id)
        .bind(ALERT_TYPE_RED_FLAG)
        .bind(payload_json)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn has_red_flag(&self, assessment_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM check_in_alerts WHERE assessment_id = $1 AND type = $2)",
        )
        .bind(assessment_id)
        .bind(ALERT_TYPE_RED_FLAG)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_alerts(&self, limit: i64) -> Result<Vec<Alert>, StoreError> {
        sqlx::query_as::<_, AlertRow>(
            "SELECT id, assessment_id, type, payload, created_at FROM check_in_alerts \
             ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Alert::try_from)
        .collect()
    }

    async fn dismiss_alert(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM check_in_alerts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_insert(
        &self,
        diagnosis_code: &str,
        day: i32,
        branch: Branch,
    ) -> Result<Option<String>, StoreError> {
        let text = sqlx::query_scalar::<_, String>(
            "SELECT insert_text FROM diagnosis_inserts \
             WHERE diagnosis_code = $1 AND day = $2 AND branch = $3 AND btrim(insert_text) <> ''",
        )
        .bind(diagnosis_code)
        .bind(day)
        .bind(branch.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(text)
    }

    async fn find_template(
        &self,
        key: &str,
        channel: Channel,
    ) -> Result<Option<MessageTemplate>, StoreError> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT key, channel, subject, shell_text, disclaimer_text FROM message_templates \
             WHERE key = $1 AND channel = $2",
        )
        .bind(key)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(MessageTemplate {
                key: row.key,
                channel: row.channel.parse()?,
                subject: row.subject,
                shell_text: row.shell_text,
                disclaimer_text: row.disclaimer_text,
            })
        })
        .transpose()
    }

    async fn encouragement_pool(&self, limit: i64) -> Result<Vec<String>, StoreError> {
        let lines = sqlx::query_scalar::<_, String>(
            "SELECT text FROM encouragements WHERE btrim(text) <> '' ORDER BY id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }

    async fn erase_assessment(&self, assessment_id: Uuid) -> Result<ErasureCounts, StoreError> {
        let mut tx = self.pool.begin().await?;

        let queue_items_deleted = sqlx::query("DELETE FROM check_in_queue WHERE assessment_id = $1")
            .bind(assessment_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let responses_deleted =
            sqlx::query("DELETE FROM check_in_responses WHERE assessment_id = $1")
                .bind(assessment_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        let alerts_deleted = sqlx::query("DELETE FROM check_in_alerts WHERE assessment_id = $1")
            .bind(assessment_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(ErasureCounts {
            queue_items_deleted,
            responses_deleted,
            alerts_deleted,
        })
    }

    async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}
