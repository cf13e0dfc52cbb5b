//! Admin console handlers: form-driven CRUD over courses and lessons.
//!
//! Mutations answer with a redirect back to the admin view, matching the
//! form-post flow of the console; listings are JSON.

use crate::{
    errors::AppError,
    models::{course::Course, lesson::Lesson},
    services::catalog_service::{CourseInput, LessonInput},
    state::AppState,
};
use axum::{
    Form, Json,
    extract::{Path, State},
    response::Redirect,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CourseForm {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

impl From<CourseForm> for CourseInput {
    fn from(form: CourseForm) -> Self {
        CourseInput {
            title: form.title,
            slug: form.slug,
            description: form.description,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LessonMetadataForm {
    pub course_id: Uuid,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub content: String,
}

/// `GET /admin/courses`
pub async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>, AppError> {
    Ok(Json(state.catalog.list_courses().await?))
}

/// `POST /admin/courses`
pub async fn create_course(
    State(state): State<AppState>,
    Form(form): Form<CourseForm>,
) -> Result<Redirect, AppError> {
    let course = state.catalog.create_course(form.into()).await?;
    tracing::info!(course = %course.id, slug = %course.slug, "course created");
    Ok(Redirect::to("/admin/courses"))
}

/// `POST /admin/courses/{id}`
pub async fn update_course(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<CourseForm>,
) -> Result<Redirect, AppError> {
    state.catalog.update_course(id, form.into()).await?;
    Ok(Redirect::to("/admin/courses"))
}

/// `POST /admin/courses/{id}/delete`
pub async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Redirect, AppError> {
    state.catalog.delete_course(id).await?;
    Ok(Redirect::to("/admin/courses"))
}

/// `GET /admin/lessons`
pub async fn list_lessons(State(state): State<AppState>) -> Result<Json<Vec<Lesson>>, AppError> {
    Ok(Json(state.catalog.list_lessons().await?))
}

/// `POST /admin/lessons/{id}` — metadata only; the video reference is
/// untouched (the served path is stable for the lesson's lifetime).
pub async fn update_lesson(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<LessonMetadataForm>,
) -> Result<Redirect, AppError> {
    let input = LessonInput {
        course_id: form.course_id,
        title: form.title,
        slug: form.slug,
        description: form.description,
        duration_minutes: form.duration,
        sort_order: form.sort_order,
        content: form.content,
        video_url: None,
    };
    state.catalog.update_lesson(id, input).await?;
    Ok(Redirect::to("/admin/lessons"))
}

/// `POST /admin/lessons/{id}/delete` — removes the catalog row; stored
/// video files are retained on disk.
pub async fn delete_lesson(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Redirect, AppError> {
    state.catalog.delete_lesson(id).await?;
    Ok(Redirect::to("/admin/lessons"))
}
