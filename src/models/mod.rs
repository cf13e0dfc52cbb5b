//! Core data models for the learning-management service.
//!
//! These entities represent courses, their lessons, user accounts and the
//! stored-video lifecycle. They map cleanly to database tables via
//! `sqlx::FromRow` and serialize naturally as JSON via `serde`.

pub mod course;
pub mod lesson;
pub mod progress;
pub mod user;
pub mod video;
