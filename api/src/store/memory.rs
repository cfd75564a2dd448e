//! In-process store for handler and engine tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use checkin_core::checkins::{
    ALERT_TYPE_RED_FLAG, Alert, AlertPayload, AssessmentProfile, Branch, Channel,
    CheckInResponse, MessageTemplate, NewQueueItem, QueueItem, QueueStatus, ResponseWrite,
};

use super::{CheckInStore, ErasureCounts, StoreError};

#[derive(Default)]
struct State {
    assessments: HashMap<Uuid, AssessmentProfile>,
    sms_opt_outs: HashSet<String>,
    queue: Vec<QueueItem>,
    responses: BTreeMap<(Uuid, i32), CheckInResponse>,
    alerts: Vec<Alert>,
    inserts: HashMap<(String, i32, Branch), String>,
    templates: HashMap<(String, Channel), MessageTemplate>,
    encouragements: Vec<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_content: AtomicBool,
    fail_writes: AtomicBool,
    lookup_delay_ms: AtomicU64,
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_assessment(&self, profile: AssessmentProfile) {
        self.state
            .lock()
            .await
            .assessments
            .insert(profile.id, profile);
    }

    pub async fn add_insert(&self, diagnosis_code: &str, day: i32, branch: Branch, text: &str) {
        self.state
            .lock()
            .await
            .inserts
            .insert((diagnosis_code.to_string(), day, branch), text.to_string());
    }

    pub async fn add_template(&self, template: MessageTemplate) {
        self.state
            .lock()
            .await
            .templates
            .insert((template.key.clone(), template.channel), template);
    }

    pub async fn add_encouragement(&self, text: &str) {
        self.state
            .lock()
            .await
            .encouragements
            .push(text.to_string());
    }

    /// Make content lookups fail as if the database were unreachable.
    pub fn fail_content_reads(&self, fail: bool) {
        self.fail_content.store(fail, Ordering::SeqCst);
    }

    /// Make response and alert writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stall sender lookups, for exercising request timeouts.
    pub fn delay_lookups(&self, delay: Duration) {
        self.lookup_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn all_queue_items(&self) -> Vec<QueueItem> {
        self.state.lock().await.queue.clone()
    }

    pub async fn all_alerts(&self) -> Vec<Alert> {
        self.state.lock().await.alerts.clone()
    }

    pub async fn is_sms_opted_out(&self, phone: &str) -> bool {
        self.state.lock().await.sms_opt_outs.contains(phone)
    }

    fn check_content(&self) -> Result<(), StoreError> {
        if self.fail_content.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

fn with_opt_out(state: &State, profile: &AssessmentProfile) -> AssessmentProfile {
    let mut profile = profile.clone();
    profile.sms_opt_out = profile
        .phone
        .as_ref()
        .is_some_and(|phone| state.sms_opt_outs.contains(phone));
    profile
}

#[async_trait]
impl CheckInStore for MemoryStore {
    async fn enqueue(&self, item: &NewQueueItem) -> Result<QueueItem, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.queue.iter_mut().find(|q| {
            q.assessment_id == item.assessment_id && q.day == item.day && q.channel == item.channel
        }) {
            if existing.status == QueueStatus::Queued {
                existing.due_at = item.due_at;
                existing.template_key = item.template_key();
            }
            return Ok(existing.clone());
        }

        let queued = QueueItem {
            id: Uuid::now_v7(),
            assessment_id: item.assessment_id,
            day: item.day,
            due_at: item.due_at,
            template_key: item.template_key(),
            channel: item.channel,
            status: QueueStatus::Queued,
            sent_at: None,
            last_error: None,
        };
        state.queue.push(queued.clone());
        Ok(queued)
    }

    async fn due_items(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<QueueItem>, StoreError> {
        let state = self.state.lock().await;
        let mut due: Vec<QueueItem> = state
            .queue
            .iter()
            .filter(|q| q.status == QueueStatus::Queued && q.due_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.due_at.cmp(&b.due_at).then(a.id.cmp(&b.id)));
        due.truncate(usize::try_from(limit.max(0)).unwrap_or(0));
        Ok(due)
    }

    async fn claim_item(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state
            .queue
            .iter_mut()
            .find(|q| q.id == id && q.status == QueueStatus::Queued)
        {
            Some(item) => {
                item.status = QueueStatus::Sent;
                item.sent_at = Some(now);
                item.last_error = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(item) = state
            .queue
            .iter_mut()
            .find(|q| q.id == id && q.status == QueueStatus::Sent)
        {
            item.status = QueueStatus::Failed;
            item.sent_at = None;
            item.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn requeue_failed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state
            .queue
            .iter_mut()
            .find(|q| q.id == id && q.status == QueueStatus::Failed)
        {
            Some(item) => {
                item.status = QueueStatus::Queued;
                item.due_at = now;
                item.last_error = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn queue_item(&self, id: Uuid) -> Result<Option<QueueItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.queue.iter().find(|q| q.id == id).cloned())
    }

    async fn scheduled_days(
        &self,
        assessment_id: Uuid,
        channel: Channel,
    ) -> Result<Vec<i32>, StoreError> {
        let state = self.state.lock().await;
        let mut days: Vec<i32> = state
            .queue
            .iter()
            .filter(|q| q.assessment_id == assessment_id && q.channel == channel)
            .map(|q| q.day)
            .collect();
        days.sort_unstable();
        Ok(days)
    }

    async fn assessment(&self, id: Uuid) -> Result<Option<AssessmentProfile>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .assessments
            .get(&id)
            .map(|profile| with_opt_out(&state, profile)))
    }

    async fn assessment_for_phone(
        &self,
        phone: &str,
    ) -> Result<Option<AssessmentProfile>, StoreError> {
        let delay = self.lookup_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let state = self.state.lock().await;
        Ok(state
            .assessments
            .values()
            .filter(|profile| profile.phone.as_deref() == Some(phone))
            .max_by_key(|profile| profile.created_at)
            .map(|profile| with_opt_out(&state, profile)))
    }

    async fn record_sms_opt_out(&self, phone: &str) -> Result<(), StoreError> {
        self.check_writes()?;
        self.state
            .lock()
            .await
            .sms_opt_outs
            .insert(phone.to_string());
        Ok(())
    }

    async fn responses(&self, assessment_id: Uuid) -> Result<Vec<CheckInResponse>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .responses
            .values()
            .filter(|r| r.assessment_id == assessment_id)
            .cloned()
            .collect())
    }

    async fn upsert_response(&self, write: ResponseWrite) -> Result<CheckInResponse, StoreError> {
        self.check_writes()?;
        let mut state = self.state.lock().await;
        let key = (write.assessment_id, write.day);
        let merged = write.apply(state.responses.get(&key), Utc::now());
        state.responses.insert(key, merged.clone());
        Ok(merged)
    }

    async fn latest_branch_before(
        &self,
        assessment_id: Uuid,
        day: i32,
    ) -> Result<Option<Branch>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .responses
            .range((assessment_id, i32::MIN)..(assessment_id, day))
            .next_back()
            .map(|(_, response)| Branch::from(response.value)))
    }

    async fn insert_alert(
        &self,
        assessment_id: Uuid,
        payload: &AlertPayload,
    ) -> Result<Alert, StoreError> {
        self.check_writes()?;
        let alert = Alert {
            id: Uuid::now_v7(),
            assessment_id,
            alert_type: ALERT_TYPE_RED_FLAG.to_string(),
            payload: payload.clone(),
            created_at: Utc::now(),
        };
        self.state.lock().await.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn has_red_flag(&self, assessment_id: Uuid) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .alerts
            .iter()
            .any(|a| a.assessment_id == assessment_id && a.alert_type == ALERT_TYPE_RED_FLAG))
    }

    async fn list_alerts(&self, limit: i64) -> Result<Vec<Alert>, StoreError> {
        let state = self.state.lock().await;
        let mut alerts = state.alerts.clone();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts.truncate(usize::try_from(limit.max(0)).unwrap_or(0));
        Ok(alerts)
    }

    async fn dismiss_alert(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.alerts.len();
        state.alerts.retain(|a| a.id != id);
        Ok(state.alerts.len() != before)
    }

    async fn find_insert(
        &self,
        diagnosis_code: &str,
        day: i32,
        branch: Branch,
    ) -> Result<Option<String>, StoreError> {
        self.check_content()?;
        let state = self.state.lock().await;
        Ok(state
            .inserts
            .get(&(diagnosis_code.to_string(), day, branch))
            .filter(|text| !text.trim().is_empty())
            .cloned())
    }

    async fn find_template(
        &self,
        key: &str,
        channel: Channel,
    ) -> Result<Option<MessageTemplate>, StoreError> {
        self.check_content()?;
        let state = self.state.lock().await;
        Ok(state.templates.get(&(key.to_string(), channel)).cloned())
    }

    async fn encouragement_pool(&self, limit: i64) -> Result<Vec<String>, StoreError> {
        self.check_content()?;
        let state = self.state.lock().await;
        Ok(state
            .encouragements
            .iter()
            .filter(|line| !line.trim().is_empty())
            .take(usize::try_from(limit.max(0)).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn erase_assessment(&self, assessment_id: Uuid) -> Result<ErasureCounts, StoreError> {
        let mut state = self.state.lock().await;

        let queue_before = state.queue.len();
        state.queue.retain(|q| q.assessment_id != assessment_id);
        let responses_before = state.responses.len();
        state.responses.retain(|(id, _), _| *id != assessment_id);
        let alerts_before = state.alerts.len();
        state.alerts.retain(|a| a.assessment_id != assessment_id);

        Ok(ErasureCounts {
            queue_items_deleted: (queue_before - state.queue.len()) as u64,
            responses_deleted: (responses_before - state.responses.len()) as u64,
            alerts_deleted: (alerts_before - state.alerts.len()) as u64,
        })
    }

    async fn ping(&self) -> bool {
        true
    }
}
