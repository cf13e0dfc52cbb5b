//! Per-user lesson completion state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One user's progress on one lesson.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct LessonProgress {
    pub user_id: Uuid,
    pub lesson_id: Uuid,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}
