//! Public catalog and progress handlers.

use crate::{
    errors::AppError,
    models::{course::Course, lesson::Lesson, progress::LessonProgress, user::CurrentUser},
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use uuid::Uuid;

/// A course together with its lessons in display order.
#[derive(Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub lessons: Vec<Lesson>,
}

/// `GET /api/courses`
pub async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>, AppError> {
    Ok(Json(state.catalog.list_courses().await?))
}

/// `GET /api/courses/{slug}`
pub async fn get_course(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CourseDetail>, AppError> {
    let (course, lessons) = state.catalog.get_course_by_slug(&slug).await?;
    Ok(Json(CourseDetail { course, lessons }))
}

/// `GET /api/lessons/{id}`
pub async fn get_lesson(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lesson>, AppError> {
    Ok(Json(state.catalog.get_lesson(id).await?))
}

/// `POST /api/lessons/{id}/complete`
pub async fn complete_lesson(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.catalog.set_progress(user.id, id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/lessons/{id}/complete`
pub async fn uncomplete_lesson(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.catalog.set_progress(user.id, id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/progress` — the signed-in user's completed lessons.
pub async fn my_progress(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<LessonProgress>>, AppError> {
    Ok(Json(state.catalog.progress_for_user(user.id).await?))
}
