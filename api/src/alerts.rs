use uuid::Uuid;

use checkin_core::alerts::{note_excerpt, scan_note};
use checkin_core::checkins::{Alert, AlertPayload};

use crate::store::{CheckInStore, StoreError};

/// Scan a submitted note and persist an alert when it matches. Each matching
/// submission gets its own row, even for the same assessment and day.
pub async fn record_note_alert(
    store: &dyn CheckInStore,
    assessment_id: Uuid,
    day: i32,
    note: &str,
) -> Result<Option<Alert>, StoreError> {
    let matched = scan_note(note);
    if matched.is_empty() {
        return Ok(None);
    }

    let payload = AlertPayload {
        day,
        matched: matched.iter().map(|term| term.to_string()).collect(),
        note_excerpt: note_excerpt(note),
    };
    let alert = store.insert_alert(assessment_id, &payload).await?;

    tracing::warn!(
        alert_id = %alert.id,
        assessment_id = %assessment_id,
        day,
        matched = matched.len(),
        "red-flag alert raised from check-in note"
    );
    Ok(Some(alert))
}
