//! Represents a course — a top-level container for lessons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A course in the catalog.
///
/// Courses act as namespaces for lessons and are addressed publicly by
/// their slug.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Course {
    /// Unique identifier for this course (UUID for internal DB use).
    pub id: Uuid,

    /// Human-readable course title.
    pub title: String,

    /// URL-safe unique identifier used in public routes.
    pub slug: String,

    /// Free-form course description.
    pub description: String,

    /// When this course was created.
    pub created_at: DateTime<Utc>,
}
