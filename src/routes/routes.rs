//! Defines routes for the catalog, progress, auth, admin and video surfaces.
//!
//! ## Structure
//! - **Public endpoints**
//!   - `GET  /healthz`, `GET /readyz` — probes
//!   - `POST /api/login`, `POST /api/logout` — sessions
//!   - `GET  /api/courses`, `GET /api/courses/{slug}`, `GET /api/lessons/{id}`
//!   - `GET  /videos/{file_name}` — range-aware video streaming
//!
//! - **Signed-in endpoints** (session required)
//!   - `POST/DELETE /api/lessons/{id}/complete`, `GET /api/progress`
//!
//! - **Admin endpoints** (admin session required)
//!   - `GET/POST /admin/courses`, `POST /admin/courses/{id}[/delete]`
//!   - `GET/POST /admin/lessons`, `POST /admin/lessons/{id}[/delete]`
//!
//! The lesson-create route carries the multipart upload, so the admin group
//! gets a body limit sized above the configured video cap; the service's own
//! mid-stream check is what actually enforces the cap.

use crate::{
    handlers::{
        admin_handlers, auth_handlers, catalog_handlers,
        health_handlers::{healthz, readyz},
        video_handlers,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

/// Headroom above the video cap for the other multipart form fields.
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build and return the router for the whole application.
///
/// The router carries shared state (`AppState`) to all handlers; the auth
/// middlewares resolve the session cookie before any gated handler runs.
pub fn routes(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/admin/courses",
            get(admin_handlers::list_courses).post(admin_handlers::create_course),
        )
        .route("/admin/courses/{id}", post(admin_handlers::update_course))
        .route(
            "/admin/courses/{id}/delete",
            post(admin_handlers::delete_course),
        )
        .route(
            "/admin/lessons",
            get(admin_handlers::list_lessons).post(video_handlers::upload_lesson),
        )
        .route("/admin/lessons/{id}", post(admin_handlers::update_lesson))
        .route(
            "/admin/lessons/{id}/delete",
            post(admin_handlers::delete_lesson),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_handlers::require_admin,
        ))
        .layer(DefaultBodyLimit::max(
            state.max_upload_bytes as usize + UPLOAD_OVERHEAD_BYTES,
        ));

    let member = Router::new()
        .route(
            "/api/lessons/{id}/complete",
            post(catalog_handlers::complete_lesson).delete(catalog_handlers::uncomplete_lesson),
        )
        .route("/api/progress", get(catalog_handlers::my_progress))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_handlers::require_user,
        ));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // sessions
        .route("/api/login", post(auth_handlers::login))
        .route("/api/logout", post(auth_handlers::logout))
        // public catalog
        .route("/api/courses", get(catalog_handlers::list_courses))
        .route("/api/courses/{slug}", get(catalog_handlers::get_course))
        .route("/api/lessons/{id}", get(catalog_handlers::get_lesson))
        // video streaming
        .route("/videos/{file_name}", get(video_handlers::stream_video))
        .merge(admin)
        .merge(member)
        .with_state(state)
}
