//! CatalogService — courses, lessons and per-user progress backed by SQLite.
//! All durable metadata goes through parameterized SQL against the shared
//! pool; payload bytes never pass through here.

use crate::models::{course::Course, lesson::Lesson, progress::LessonProgress};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("course `{0}` not found")]
    CourseNotFound(String),
    #[error("lesson `{0}` not found")]
    LessonNotFound(Uuid),
    #[error("slug `{0}` is already in use")]
    SlugTaken(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Fields accepted when creating or updating a course.
#[derive(Debug, Clone)]
pub struct CourseInput {
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// Fields accepted when creating or updating a lesson.
#[derive(Debug, Clone)]
pub struct LessonInput {
    pub course_id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub duration_minutes: i64,
    pub sort_order: i64,
    pub content: String,
    pub video_url: Option<String>,
}

const LESSON_COLUMNS: &str = "id, course_id, title, slug, description, duration_minutes, \
     sort_order, content, video_url, created_at";

#[derive(Clone)]
pub struct CatalogService {
    pub db: Arc<SqlitePool>,
}

impl CatalogService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn list_courses(&self) -> CatalogResult<Vec<Course>> {
        let rows = sqlx::query_as::<_, Course>(
            "SELECT id, title, slug, description, created_at FROM courses ORDER BY title ASC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    pub async fn get_course_by_slug(&self, slug: &str) -> CatalogResult<(Course, Vec<Lesson>)> {
        let course = sqlx::query_as::<_, Course>(
            "SELECT id, title, slug, description, created_at FROM courses WHERE slug = ?",
        )
        .bind(slug)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => CatalogError::CourseNotFound(slug.to_string()),
            other => CatalogError::Sqlx(other),
        })?;

        let lessons = sqlx::query_as::<_, Lesson>(&format!(
            "SELECT {LESSON_COLUMNS} FROM lessons
             WHERE course_id = ? ORDER BY sort_order ASC, created_at ASC"
        ))
        .bind(course.id)
        .fetch_all(&*self.db)
        .await?;

        Ok((course, lessons))
    }

    async fn fetch_course(&self, id: Uuid) -> CatalogResult<Course> {
        sqlx::query_as::<_, Course>(
            "SELECT id, title, slug, description, created_at FROM courses WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => CatalogError::CourseNotFound(id.to_string()),
            other => CatalogError::Sqlx(other),
        })
    }

    pub async fn create_course(&self, input: CourseInput) -> CatalogResult<Course> {
        let course = Course {
            id: Uuid::new_v4(),
            title: input.title,
            slug: input.slug,
            description: input.description,
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO courses (id, title, slug, description, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(course.id)
        .bind(&course.title)
        .bind(&course.slug)
        .bind(&course.description)
        .bind(course.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(course),
            Err(err) if is_unique_violation(&err) => Err(CatalogError::SlugTaken(course.slug)),
            Err(err) => Err(CatalogError::Sqlx(err)),
        }
    }

    pub async fn update_course(&self, id: Uuid, input: CourseInput) -> CatalogResult<Course> {
        let result = sqlx::query(
            "UPDATE courses SET title = ?, slug = ?, description = ? WHERE id = ?",
        )
        .bind(&input.title)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(id)
        .execute(&*self.db)
        .await;

        match result {
            Ok(res) if res.rows_affected() == 0 => Err(CatalogError::CourseNotFound(id.to_string())),
            Ok(_) => self.fetch_course(id).await,
            Err(err) if is_unique_violation(&err) => Err(CatalogError::SlugTaken(input.slug)),
            Err(err) => Err(CatalogError::Sqlx(err)),
        }
    }

    /// Delete a course and its lessons. Progress rows referencing the
    /// deleted lessons are removed as well; stored video files are retained.
    pub async fn delete_course(&self, id: Uuid) -> CatalogResult<()> {
        sqlx::query(
            "DELETE FROM lesson_progress WHERE lesson_id IN
             (SELECT id FROM lessons WHERE course_id = ?)",
        )
        .bind(id)
        .execute(&*self.db)
        .await?;
        sqlx::query("DELETE FROM lessons WHERE course_id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        let result = sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::CourseNotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn get_lesson(&self, id: Uuid) -> CatalogResult<Lesson> {
        sqlx::query_as::<_, Lesson>(&format!(
            "SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => CatalogError::LessonNotFound(id),
            other => CatalogError::Sqlx(other),
        })
    }

    pub async fn list_lessons(&self) -> CatalogResult<Vec<Lesson>> {
        let rows = sqlx::query_as::<_, Lesson>(&format!(
            "SELECT {LESSON_COLUMNS} FROM lessons ORDER BY created_at DESC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    pub async fn create_lesson(&self, input: LessonInput) -> CatalogResult<Lesson> {
        // Surface a missing course as such instead of a bare FK error.
        self.fetch_course(input.course_id).await?;

        let lesson = Lesson {
            id: Uuid::new_v4(),
            course_id: input.course_id,
            title: input.title,
            slug: input.slug,
            description: input.description,
            duration_minutes: input.duration_minutes,
            sort_order: input.sort_order,
            content: input.content,
            video_url: input.video_url,
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO lessons (id, course_id, title, slug, description, duration_minutes,
                                  sort_order, content, video_url, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(lesson.id)
        .bind(lesson.course_id)
        .bind(&lesson.title)
        .bind(&lesson.slug)
        .bind(&lesson.description)
        .bind(lesson.duration_minutes)
        .bind(lesson.sort_order)
        .bind(&lesson.content)
        .bind(&lesson.video_url)
        .bind(lesson.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(lesson),
            Err(err) if is_unique_violation(&err) => Err(CatalogError::SlugTaken(lesson.slug)),
            Err(err) => Err(CatalogError::Sqlx(err)),
        }
    }

    /// Update lesson metadata. The stored `video_url` is preserved; the
    /// transcode step never changes it either, only the bytes underneath.
    pub async fn update_lesson(&self, id: Uuid, input: LessonInput) -> CatalogResult<Lesson> {
        let result = sqlx::query(
            "UPDATE lessons SET course_id = ?, title = ?, slug = ?, description = ?,
                    duration_minutes = ?, sort_order = ?, content = ?
             WHERE id = ?",
        )
        .bind(input.course_id)
        .bind(&input.title)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.duration_minutes)
        .bind(input.sort_order)
        .bind(&input.content)
        .bind(id)
        .execute(&*self.db)
        .await;

        match result {
            Ok(res) if res.rows_affected() == 0 => Err(CatalogError::LessonNotFound(id)),
            Ok(_) => self.get_lesson(id).await,
            Err(err) if is_unique_violation(&err) => Err(CatalogError::SlugTaken(input.slug)),
            Err(err) => Err(CatalogError::Sqlx(err)),
        }
    }

    pub async fn delete_lesson(&self, id: Uuid) -> CatalogResult<()> {
        sqlx::query("DELETE FROM lesson_progress WHERE lesson_id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        let result = sqlx::query("DELETE FROM lessons WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::LessonNotFound(id));
        }
        Ok(())
    }

    /// Upsert one user's completion flag for a lesson.
    pub async fn set_progress(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        completed: bool,
    ) -> CatalogResult<()> {
        self.get_lesson(lesson_id).await?;
        sqlx::query(
            "INSERT INTO lesson_progress (user_id, lesson_id, completed, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                completed = excluded.completed,
                updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(lesson_id)
        .bind(completed)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// The user's completed-progress rows, most recent first.
    pub async fn progress_for_user(&self, user_id: Uuid) -> CatalogResult<Vec<LessonProgress>> {
        let rows = sqlx::query_as::<_, LessonProgress>(
            "SELECT user_id, lesson_id, completed, updated_at
             FROM lesson_progress WHERE user_id = ? AND completed = 1
             ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
