//! Fixtures shared by the engine, processor, and route tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use checkin_core::checkins::{AssessmentProfile, Tier};
use checkin_core::token::{DEFAULT_TTL_DAYS, TokenCodec};

use crate::content::ContentResolver;
use crate::dispatch::DispatchEngine;
use crate::store::memory::MemoryStore;
use crate::transport::recording::RecordingTransport;

pub const SECRET: &str = "test-secret-0123456789abcdef0123456789";
pub const BASE_URL: &str = "https://care.example.com";

pub fn codec() -> TokenCodec {
    TokenCodec::new(SECRET.as_bytes(), Duration::days(DEFAULT_TTL_DAYS)).expect("valid test codec")
}

pub fn profile(created_at: DateTime<Utc>) -> AssessmentProfile {
    let id = Uuid::now_v7();
    AssessmentProfile {
        id,
        diagnosis_code: "lbp_mechanical".to_string(),
        initial_score: Some(6),
        tier: Tier::Free,
        email: Some(format!("{}@example.com", id.simple())),
        phone: Some(format!("+1555{}", &id.simple().to_string()[24..])),
        marketing_opt_out: false,
        sms_opt_out: false,
        created_at,
    }
}

pub fn engine(store: &Arc<MemoryStore>, transport: &Arc<RecordingTransport>) -> DispatchEngine {
    DispatchEngine::new(
        store.clone(),
        ContentResolver::new(store.clone()),
        codec(),
        transport.clone(),
        BASE_URL,
    )
}
