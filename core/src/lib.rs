//! Domain core for patient check-ins: shared types, signed reply tokens,
//! content fallback ordering, SMS reply classification, and red-flag scanning.
//!
//! Everything here is pure; persistence and transports live in `checkin-api`.

pub mod alerts;
pub mod checkins;
pub mod content;
pub mod error;
pub mod inbound;
pub mod token;
