pub mod alerts;
pub mod checkins;
pub mod health;
pub mod token;
