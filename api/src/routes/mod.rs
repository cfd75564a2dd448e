pub mod alerts;
pub mod checkins;
pub mod health;
pub mod reply;
pub mod sms;
