//! Represents a lesson within a course.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single lesson belonging to a course.
///
/// The `video_url` field holds the served path of the lesson's video. It is
/// set at upload time, before transcoding completes, and is never changed by
/// the transcode step: the path is stable, only the bytes underneath change.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Lesson {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent course.
    pub course_id: Uuid,

    /// Lesson title.
    pub title: String,

    /// URL-safe identifier, unique within the course.
    pub slug: String,

    /// Free-form lesson description.
    pub description: String,

    /// Approximate duration in minutes.
    pub duration_minutes: i64,

    /// Position of the lesson within its course.
    pub sort_order: i64,

    /// Lesson body (markdown or plain text).
    pub content: String,

    /// Served path of the lesson video, if one was uploaded.
    pub video_url: Option<String>,

    /// When this lesson was created.
    pub created_at: DateTime<Utc>,
}
